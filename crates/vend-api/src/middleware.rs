//! HTTP middleware for the gateway surface.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, header},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};
use vend_core::RequestId;
use vend_trace::{TRACEPARENT_HEADER, TraceContext};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the identity-provider token on `GET /exchange`.
pub const ID_TOKEN_HEADER: &str = "x-idtoken";

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(ID_TOKEN_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .allow_origin(Any)
}

/// Assign a [`RequestId`] to each request and echo it on the response.
///
/// When the caller sent a valid `traceparent`, its trace id becomes the
/// request id so gateway and broker logs correlate.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(TRACEPARENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(TraceContext::from_traceparent)
        .and_then(|ctx| RequestId::from_trace_id(&ctx.trace_id))
        .unwrap_or_else(RequestId::new);

    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
