//! Logging and tracing for the token exchange broker.
//!
//! Installs the `tracing` subscriber (text or JSON lines, optional OTLP
//! export), parses W3C trace context and builds exchange spans.

pub mod context;
pub mod spans;
pub mod tracer;

pub use context::{TRACEPARENT_HEADER, TraceContext};
pub use spans::{exchange_span, key_fetch_span, record_outcome, stage_span};
pub use tracer::{LogFormat, OtlpConfig, TracerError, TracingConfig, init_tracer, shutdown_tracer};
