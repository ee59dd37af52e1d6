//! Token exchange handlers.

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;
use vend_core::{
    ExchangeFailure, ExchangeStage, FailureKind, IncomingRequest, RequestId, TemporaryCredentials,
};
use vend_trace::{exchange_span, record_outcome};

use crate::middleware::ID_TOKEN_HEADER;
use crate::state::AppState;

/// Response for one exchange: credentials or a structured failure.
pub enum ExchangeReply {
    Issued(TemporaryCredentials),
    Failed(ExchangeFailure),
}

impl IntoResponse for ExchangeReply {
    fn into_response(self) -> Response {
        match self {
            ExchangeReply::Issued(credentials) => (StatusCode::OK, Json(credentials)).into_response(),
            ExchangeReply::Failed(failure) => {
                (status_for(failure.kind), Json(failure.to_response())).into_response()
            }
        }
    }
}

impl From<Result<TemporaryCredentials, ExchangeFailure>> for ExchangeReply {
    fn from(result: Result<TemporaryCredentials, ExchangeFailure>) -> Self {
        match result {
            Ok(credentials) => ExchangeReply::Issued(credentials),
            Err(failure) => ExchangeReply::Failed(failure),
        }
    }
}

/// HTTP status for each failure kind. Never 2xx.
pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::MalformedToken | FailureKind::MissingKeyId => StatusCode::BAD_REQUEST,
        FailureKind::SignatureInvalid => StatusCode::UNAUTHORIZED,
        FailureKind::FederationRejected | FailureKind::AssumeRoleRejected => StatusCode::FORBIDDEN,
        FailureKind::ContextMissing => StatusCode::BAD_GATEWAY,
        FailureKind::KeyLookupError
        | FailureKind::FederationUnavailable
        | FailureKind::AssumeRoleUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `GET /exchange` with the token in the `X-Idtoken` header.
pub async fn exchange_from_header(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> ExchangeReply {
    let id_token = headers
        .get(ID_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let request = IncomingRequest {
        id_token,
        path: uri.path().to_string(),
        http_method: method.to_string(),
    };

    state.broker.exchange_with_id(request_id, &request).await.into()
}

/// `POST /exchange` with a JSON request event body.
pub async fn exchange_from_body(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    method: Method,
    uri: Uri,
    body: Result<Json<IncomingRequest>, JsonRejection>,
) -> ExchangeReply {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let failure = ExchangeFailure {
                request_id,
                kind: FailureKind::MalformedToken,
                stage: ExchangeStage::Received,
                detail: format!("request body is not a valid exchange request: {}", rejection.body_text()),
            };

            let span = exchange_span(&request_id, method.as_str(), uri.path());
            record_outcome(&span, failure.stage, failure.kind.as_str());
            span.in_scope(|| {
                info!(
                    request_id = %request_id,
                    kind = %failure.kind,
                    stage = failure.stage.as_str(),
                    error = %rejection,
                    "Exchange refused"
                )
            });
            return ExchangeReply::Failed(failure);
        }
    };

    state.broker.exchange_with_id(request_id, &request).await.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_app;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use std::fmt;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;
    use vend_auth::testutil::{self, FakeFederation, FakeRoleAssumer, RoleMode, TokenBuilder};
    use vend_auth::{KeyResolver, TokenExchangeBroker, TokenVerifier};
    use wiremock::matchers::method as http_method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn app(server: &MockServer, roles: RoleMode) -> axum::Router {
        Mock::given(http_method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(testutil::default_jwks()))
            .mount(server)
            .await;

        let config = testutil::test_config(&format!("{}/keys", server.uri()));
        let resolver = Arc::new(KeyResolver::from_config(&config).unwrap());
        let broker = TokenExchangeBroker::new(
            TokenVerifier::new(resolver, &config),
            Arc::new(FakeFederation::with_context("ctx")),
            Arc::new(FakeRoleAssumer::new(roles)),
            Duration::from_secs(1),
        );
        build_app(Arc::new(AppState::new(Arc::new(broker))))
    }

    #[derive(Debug)]
    struct CapturedEvent {
        level: Level,
        fields: String,
        spans: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct EventCollector {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    #[derive(Default)]
    struct FieldText(String);

    impl Visit for FieldText {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.push_str(&format!("{}={:?} ", field.name(), value));
        }
    }

    impl<S> tracing_subscriber::Layer<S> for EventCollector
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
            let mut fields = FieldText::default();
            event.record(&mut fields);
            let spans = ctx
                .event_scope(event)
                .map(|scope| scope.map(|span| span.name().to_owned()).collect())
                .unwrap_or_default();

            self.events.lock().expect("lock poisoned").push(CapturedEvent {
                level: *event.metadata().level(),
                fields: fields.0,
                spans,
            });
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_no_failure_kind_maps_to_success() {
        for kind in [
            FailureKind::MalformedToken,
            FailureKind::MissingKeyId,
            FailureKind::KeyLookupError,
            FailureKind::SignatureInvalid,
            FailureKind::FederationRejected,
            FailureKind::FederationUnavailable,
            FailureKind::ContextMissing,
            FailureKind::AssumeRoleRejected,
            FailureKind::AssumeRoleUnavailable,
            FailureKind::Unexpected,
        ] {
            assert!(!status_for(kind).is_success(), "{kind}");
        }
        assert_eq!(status_for(FailureKind::SignatureInvalid), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(FailureKind::ContextMissing), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_header_exchange_returns_credentials() {
        let server = MockServer::start().await;
        let app = app(&server, RoleMode::Issue).await;

        let request = Request::get("/exchange")
            .header("X-Idtoken", TokenBuilder::new().build())
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json_body(response).await;
        assert!(body["accessKeyId"].as_str().unwrap().starts_with("ASIA"));
        assert!(body["sessionToken"].is_string());
        assert!(body["expiration"].is_string());
    }

    #[tokio::test]
    async fn test_missing_header_is_structured_failure() {
        let server = MockServer::start().await;
        let app = app(&server, RoleMode::Issue).await;

        let response = app
            .oneshot(Request::get("/exchange").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let header_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
        let body = json_body(response).await;
        assert_eq!(body["message"], "MalformedToken");
        assert_eq!(body["requestId"], header_id);
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn test_body_exchange_and_role_rejection() {
        let server = MockServer::start().await;
        let app = app(&server, RoleMode::Reject).await;

        let event = serde_json::json!({
            "idToken": TokenBuilder::new().build(),
            "path": "/exchange",
            "httpMethod": "POST",
        });
        let request = Request::post("/exchange")
            .header("content-type", "application/json")
            .body(Body::from(event.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["message"], "AssumeRoleRejected");
    }

    #[tokio::test]
    async fn test_unreadable_body_is_malformed() {
        let server = MockServer::start().await;
        let app = app(&server, RoleMode::Issue).await;

        let request = Request::post("/exchange")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["message"], "MalformedToken");
    }

    #[tokio::test]
    async fn test_unreadable_body_is_logged_like_other_refusals() {
        let collector = EventCollector::default();
        let events = Arc::clone(&collector.events);
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

        let server = MockServer::start().await;
        let app = app(&server, RoleMode::Issue).await;

        let request = Request::post("/exchange")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();

        let events = events.lock().expect("lock poisoned");
        let refusal = events
            .iter()
            .find(|event| event.fields.contains("Exchange refused"))
            .unwrap_or_else(|| panic!("no refusal logged: {events:?}"));

        assert_eq!(refusal.level, Level::INFO);
        assert!(refusal.fields.contains("kind=MalformedToken"), "{refusal:?}");
        assert!(refusal.fields.contains(&format!("request_id={request_id}")), "{refusal:?}");
        assert!(refusal.spans.iter().any(|span| span == "exchange"), "{refusal:?}");
    }

    #[tokio::test]
    async fn test_traceparent_becomes_request_id() {
        let server = MockServer::start().await;
        let app = app(&server, RoleMode::Issue).await;

        let request = Request::get("/exchange")
            .header(
                "traceparent",
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            )
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response.headers()["x-request-id"],
            "req_4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let server = MockServer::start().await;
        let app = app(&server, RoleMode::Issue).await;

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");

        let response = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
