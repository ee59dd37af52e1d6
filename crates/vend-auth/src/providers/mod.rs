//! Upstream token federation and role assumption.
//!
//! The broker talks to both upstreams through the [`FederationExchanger`]
//! and [`RoleAssumer`] traits; the production implementations are backed by
//! the cloud SDK and live in [`identity_center`] and [`sts`].

pub mod identity_center;
pub mod sts;

use crate::jwt::VerifiedToken;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;
use vend_core::config::IDENTITY_CONTEXT_CLAIM;
use vend_core::{BrokerConfig, Error, Result, TemporaryCredentials};

/// Exchange a verified identity-provider token for a federated token.
#[async_trait]
pub trait FederationExchanger: Send + Sync {
    async fn exchange(&self, token: &VerifiedToken) -> Result<FederatedToken>;
}

/// Assume the configured role on behalf of an identity context.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self, context: &IdentityContext) -> Result<TemporaryCredentials>;
}

/// Token returned by the federation endpoint.
pub struct FederatedToken {
    raw: String,
    claims: Map<String, Value>,
}

impl FederatedToken {
    /// Decode a token received from the federation endpoint.
    ///
    /// Trust boundary: the signature is NOT checked here. The token is
    /// trusted only because it is the body of a successful, authenticated
    /// SDK call made by this process to the federation service over TLS.
    /// Never construct one from caller-supplied input.
    pub fn from_federation_response(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();

        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Map<String, Value>>(&raw, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| {
                warn!(error = %e, "Federation endpoint returned an undecodable token");
                Error::FederationRejected("federated token could not be decoded".to_string())
            })?
            .claims;

        Ok(Self { raw, claims })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }
}

impl fmt::Debug for FederatedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedToken")
            .field("claims", &self.claims.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Opaque identity context assertion lifted from a federated token.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityContext(String);

impl IdentityContext {
    /// Fails with `ContextMissing` when the claim is absent, empty or not a
    /// string. There is no fallback value.
    pub fn from_federated(token: &FederatedToken) -> Result<Self> {
        match token.claims.get(IDENTITY_CONTEXT_CLAIM) {
            Some(Value::String(context)) if !context.is_empty() => Ok(Self(context.clone())),
            Some(other) => {
                warn!(
                    claim = IDENTITY_CONTEXT_CLAIM,
                    json_type = json_type(other),
                    "Identity context claim has an unexpected shape"
                );
                Err(Error::ContextMissing)
            }
            None => {
                warn!(
                    claim = IDENTITY_CONTEXT_CLAIM,
                    "Federated token has no identity context claim"
                );
                Err(Error::ContextMissing)
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityContext(<{} bytes>)", self.0.len())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Shared SDK configuration: configured region, bounded calls, no retries.
pub async fn load_sdk_config(config: &BrokerConfig) -> SdkConfig {
    let timeouts = TimeoutConfig::builder()
        .connect_timeout(config.call_timeout())
        .operation_timeout(config.call_timeout())
        .build();

    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .timeout_config(timeouts)
        .retry_config(RetryConfig::disabled())
        .load()
        .await
}

/// How an upstream call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UpstreamFailure {
    /// The service answered and said no.
    Rejected(String),
    /// No usable answer: timeout, connection failure, throttling or 5xx.
    Unavailable(String),
}

const TRANSIENT_ERROR_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "SlowDown",
    "InternalServerException",
    "InternalFailure",
    "ServiceUnavailable",
    "ServiceUnavailableException",
];

/// Classify an SDK error and log the full error chain.
///
/// The returned detail is caller-safe: it names the failure class and the
/// service error code, never the response body.
pub(crate) fn classify_sdk_error<E>(operation: &str, err: &SdkError<E, HttpResponse>) -> UpstreamFailure
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    warn!(operation = operation, error = %DisplayErrorContext(err), "Upstream call failed");

    match err {
        SdkError::TimeoutError(_) => UpstreamFailure::Unavailable(format!("{} timed out", operation)),
        SdkError::DispatchFailure(_) => {
            UpstreamFailure::Unavailable(format!("{} could not reach the service", operation))
        }
        SdkError::ResponseError(_) => {
            UpstreamFailure::Unavailable(format!("{} returned an unreadable response", operation))
        }
        SdkError::ServiceError(context) => {
            let code = context.err().code().unwrap_or("Unknown");
            let status = context.raw().status().as_u16();
            if status >= 500 || TRANSIENT_ERROR_CODES.contains(&code) {
                UpstreamFailure::Unavailable(format!("{} failed upstream ({})", operation, code))
            } else {
                UpstreamFailure::Rejected(format!("{} was rejected ({})", operation, code))
            }
        }
        _ => UpstreamFailure::Unavailable(format!("{} could not be sent", operation)),
    }
}
