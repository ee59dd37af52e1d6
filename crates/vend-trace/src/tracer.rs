//! Subscriber and tracer initialization.

use opentelemetry::trace::TracerProvider;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("Failed to initialize tracer: {0}")]
    Init(String),
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// OTLP exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4317".to_string(),
            timeout_seconds: 10,
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    pub service_name: String,
    pub service_version: String,
    pub log_format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
    pub sample_rate: f64,
    pub otlp: Option<OtlpConfig>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "vend".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_format: LogFormat::Text,
            default_filter: "info".to_string(),
            sample_rate: 1.0,
            otlp: None,
        }
    }
}

impl TracingConfig {
    /// Defaults overridden by `LOG_FORMAT` and `OTEL_EXPORTER_OTLP_ENDPOINT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(format) = std::env::var("LOG_FORMAT")
            && format.eq_ignore_ascii_case("json")
        {
            config.log_format = LogFormat::Json;
        }
        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            && !endpoint.is_empty()
        {
            config.otlp = Some(OtlpConfig {
                endpoint,
                ..OtlpConfig::default()
            });
        }
        config
    }
}

/// Install the global subscriber, exporting spans over OTLP when configured.
///
/// Log lines go to stderr so stdout stays free for command output.
pub fn init_tracer(config: &TracingConfig) -> Result<(), TracerError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let registry = tracing_subscriber::registry().with(fmt_layer).with(env_filter);

    match &config.otlp {
        Some(otlp_config) => {
            let tracer = build_otlp_tracer(config, otlp_config)?;
            registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|e| TracerError::Init(e.to_string()))
        }
        None => registry
            .try_init()
            .map_err(|e| TracerError::Init(e.to_string())),
    }
}

fn build_otlp_tracer(
    config: &TracingConfig,
    otlp_config: &OtlpConfig,
) -> Result<opentelemetry_sdk::trace::Tracer, TracerError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp_config.endpoint)
        .with_timeout(std::time::Duration::from_secs(otlp_config.timeout_seconds))
        .build()
        .map_err(|e| TracerError::Init(e.to_string()))?;

    let sampler = if config.sample_rate >= 1.0 {
        Sampler::AlwaysOn
    } else if config.sample_rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(config.sample_rate)
    };

    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", config.service_version.clone()),
    ]);

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(sampler)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("vend");
    global::set_tracer_provider(provider);

    Ok(tracer)
}

/// Flush remaining spans.
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}
