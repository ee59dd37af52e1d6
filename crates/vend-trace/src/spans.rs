//! Spans for token exchanges.

use tracing::{Level, Span, span};
use vend_core::{ExchangeStage, RequestId};

/// Root span for one exchange request.
///
/// `exchange.stage` and `exchange.outcome` are recorded as the exchange
/// progresses.
pub fn exchange_span(request_id: &RequestId, method: &str, path: &str) -> Span {
    span!(
        Level::INFO,
        "exchange",
        request_id = %request_id,
        http.method = method,
        http.path = path,
        exchange.stage = ExchangeStage::Received.as_str(),
        exchange.outcome = tracing::field::Empty,
    )
}

/// Child span for a single exchange stage.
pub fn stage_span(stage: ExchangeStage) -> Span {
    span!(Level::INFO, "exchange.stage", stage = stage.as_str())
}

/// Span for a key set fetch.
pub fn key_fetch_span(kid: &str) -> Span {
    span!(Level::DEBUG, "jwks.fetch", jwks.kid = kid)
}

/// Record the terminal outcome on an exchange span.
pub fn record_outcome(span: &Span, stage: ExchangeStage, outcome: &str) {
    span.record("exchange.stage", stage.as_str());
    span.record("exchange.outcome", outcome);
}
