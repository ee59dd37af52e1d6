//! Route definitions.

use axum::{
    Router, middleware,
    routing::get,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{exchange, health};
use crate::middleware::{cors_layer, request_id};
use crate::state::AppState;

/// Routes without the middleware stack.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/exchange",
            get(exchange::exchange_from_header).post(exchange::exchange_from_body),
        )
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .with_state(state)
}

/// The complete application: routes, request ids, request tracing and CORS.
pub fn build_app(state: Arc<AppState>) -> Router {
    create_router(state)
        .layer(middleware::from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}
