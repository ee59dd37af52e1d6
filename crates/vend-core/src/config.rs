//! Broker configuration.
//!
//! Loaded once at startup from (lowest to highest precedence) an optional
//! config file, a `.env` file and the process environment. The resulting
//! [`BrokerConfig`] is immutable and passed explicitly to every component.
//! Any missing required value aborts startup.

use crate::error::{Error, Result};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// OAuth grant used for the identity-center token exchange.
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for assumed-role sessions, in seconds.
pub const SESSION_DURATION_SECS: i32 = 900;

/// Context provider the identity context assertion is attributed to.
pub const CONTEXT_PROVIDER_ARN: &str = "arn:aws:iam::aws:contextProvider/IdentityCenter";

pub const ROLE_SESSION_NAME: &str = "IdentityBearerRoleSession";

/// Claim in the federated token carrying the identity context.
pub const IDENTITY_CONTEXT_CLAIM: &str = "sts:identity_context";

fn default_algorithm() -> Algorithm {
    Algorithm::RS256
}

fn default_clock_skew() -> u64 {
    60
}

fn default_call_timeout() -> u64 {
    5
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Validated, process-wide broker configuration.
#[derive(Debug, Clone, Serialize)]
pub struct BrokerConfig {
    /// Identity-center application used as `client_id` for the exchange.
    pub idp_app_arn: String,
    /// Role assumed with the identity context.
    pub identity_bearer_role_arn: String,
    pub region: String,
    /// Key-set endpoint of the third-party identity provider.
    pub jwks_uri: Url,
    /// Algorithm incoming tokens must be signed with.
    pub jwt_algorithm: Algorithm,
    pub expected_issuer: Option<String>,
    pub expected_audience: Option<String>,
    pub clock_skew_secs: u64,
    /// Upper bound for each external call.
    pub call_timeout_secs: u64,
    pub federation_endpoint_url: Option<String>,
    pub sts_endpoint_url: Option<String>,
    pub bind_addr: String,
}

/// Shape of the merged sources before validation.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    idp_app_arn: Option<String>,
    identity_bearer_role_arn: Option<String>,
    region: Option<String>,
    tti_jwks_uri: Option<String>,
    jwt_algorithm: Option<String>,
    expected_issuer: Option<String>,
    expected_audience: Option<String>,
    clock_skew_secs: Option<u64>,
    call_timeout_secs: Option<u64>,
    federation_endpoint_url: Option<String>,
    sts_endpoint_url: Option<String>,
    bind_addr: Option<String>,
}

/// Load a `.env` file into the process environment.
///
/// An explicit `env_file` must exist. Without one, the nearest `.env` above
/// the working directory is used when present. Variables already set in the
/// environment are never overridden.
pub fn load_env_file(env_file: Option<&Path>) -> Result<()> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                Error::Config(format!("Failed to read env file {}: {}", path.display(), e))
            })?;
            debug!(path = %path.display(), "Loaded env file");
        }
        None => match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("Failed to read .env file: {}", e))),
        },
    }
    Ok(())
}

impl BrokerConfig {
    /// Merge an optional config file under the current process environment.
    pub fn from_sources(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let source = builder
            .add_source(config::Environment::default())
            .build()?;

        Self::from_config(source)
    }

    /// Build from an already-assembled configuration source.
    pub fn from_config(source: config::Config) -> Result<Self> {
        let raw: RawConfig = source.try_deserialize()?;
        raw.validate()
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl RawConfig {
    fn validate(self) -> Result<BrokerConfig> {
        let idp_app_arn = required(self.idp_app_arn, "IDP_APP_ARN")?;
        let identity_bearer_role_arn =
            required(self.identity_bearer_role_arn, "IDENTITY_BEARER_ROLE_ARN")?;
        let region = required(self.region, "REGION")?;
        let jwks_uri = required(self.tti_jwks_uri, "TTI_JWKS_URI")?;

        let jwks_uri = Url::parse(&jwks_uri)
            .map_err(|e| Error::Config(format!("TTI_JWKS_URI is not a valid URL: {}", e)))?;
        if !matches!(jwks_uri.scheme(), "https" | "http") {
            return Err(Error::Config(format!(
                "TTI_JWKS_URI must be an http(s) URL, got scheme '{}'",
                jwks_uri.scheme()
            )));
        }

        let jwt_algorithm = match non_empty(self.jwt_algorithm) {
            Some(name) => Algorithm::from_str(&name)
                .map_err(|_| Error::Config(format!("Unknown JWT_ALGORITHM: {}", name)))?,
            None => default_algorithm(),
        };
        // Keys come from a public key set; shared-secret algorithms cannot be verified against it.
        if matches!(
            jwt_algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(Error::Config(format!(
                "JWT_ALGORITHM must be asymmetric, got {:?}",
                jwt_algorithm
            )));
        }

        let call_timeout_secs = self.call_timeout_secs.unwrap_or_else(default_call_timeout);
        if call_timeout_secs == 0 {
            return Err(Error::Config("CALL_TIMEOUT_SECS must be at least 1".to_string()));
        }

        Ok(BrokerConfig {
            idp_app_arn,
            identity_bearer_role_arn,
            region,
            jwks_uri,
            jwt_algorithm,
            expected_issuer: non_empty(self.expected_issuer),
            expected_audience: non_empty(self.expected_audience),
            clock_skew_secs: self.clock_skew_secs.unwrap_or_else(default_clock_skew),
            call_timeout_secs,
            federation_endpoint_url: non_empty(self.federation_endpoint_url),
            sts_endpoint_url: non_empty(self.sts_endpoint_url),
            bind_addr: non_empty(self.bind_addr).unwrap_or_else(default_bind_addr),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| Error::Config(format!("Missing required setting {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder()
            .set_override("idp_app_arn", "arn:aws:sso::123456789012:application/ssoins-1/apl-1")
            .unwrap()
            .set_override("identity_bearer_role_arn", "arn:aws:iam::123456789012:role/Bearer")
            .unwrap()
            .set_override("region", "us-east-1")
            .unwrap()
            .set_override("tti_jwks_uri", "https://login.example.com/keys")
            .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = BrokerConfig::from_config(base().build().unwrap()).unwrap();

        assert_eq!(config.jwt_algorithm, Algorithm::RS256);
        assert_eq!(config.clock_skew_secs, 60);
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.expected_issuer.is_none());
        assert_eq!(config.jwks_uri.host_str(), Some("login.example.com"));
    }

    #[test]
    fn test_missing_required_is_fatal() {
        let source = base().set_override("region", "").unwrap().build().unwrap();
        let err = BrokerConfig::from_config(source).unwrap_err();
        assert!(err.to_string().contains("REGION"));

        let source = config::Config::builder().build().unwrap();
        assert!(matches!(
            BrokerConfig::from_config(source),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_algorithm_is_pinned_from_config() {
        let source = base()
            .set_override("jwt_algorithm", "ES256")
            .unwrap()
            .build()
            .unwrap();
        let config = BrokerConfig::from_config(source).unwrap();
        assert_eq!(config.jwt_algorithm, Algorithm::ES256);
    }

    #[test]
    fn test_symmetric_algorithm_rejected() {
        let source = base()
            .set_override("jwt_algorithm", "HS256")
            .unwrap()
            .build()
            .unwrap();
        let err = BrokerConfig::from_config(source).unwrap_err();
        assert!(err.to_string().contains("asymmetric"));
    }

    #[test]
    fn test_invalid_jwks_uri_rejected() {
        let source = base()
            .set_override("tti_jwks_uri", "not a url")
            .unwrap()
            .build()
            .unwrap();
        assert!(BrokerConfig::from_config(source).is_err());

        let source = base()
            .set_override("tti_jwks_uri", "file:///etc/keys.json")
            .unwrap()
            .build()
            .unwrap();
        assert!(BrokerConfig::from_config(source).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let source = base()
            .set_override("call_timeout_secs", 0)
            .unwrap()
            .build()
            .unwrap();
        assert!(BrokerConfig::from_config(source).is_err());
    }

    #[test]
    fn test_missing_explicit_env_file_is_fatal() {
        let err = load_env_file(Some(Path::new("/nonexistent/vend-test.env"))).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("vend-test.env")));
    }
}
