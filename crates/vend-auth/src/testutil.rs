//! Fixtures and in-process fakes for exercising the broker without a live
//! identity provider or cloud account.
//!
//! Enabled for this crate's own tests and, through the `testutil` feature,
//! for downstream integration tests.

use crate::jwt::VerifiedToken;
use crate::providers::{FederatedToken, FederationExchanger, IdentityContext, RoleAssumer};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Map, Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;
use vend_core::config::IDENTITY_CONTEXT_CLAIM;
use vend_core::{BrokerConfig, Error, Result, TemporaryCredentials};

pub const TEST_KID: &str = "test-key-1";

/// Private half of the key published by [`default_jwks`].
pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");

/// A well-formed key that no test key set publishes.
pub const ROGUE_KEY_PEM: &str = include_str!("../fixtures/rogue_key.pem");

pub const SIGNING_KEY_MODULUS: &str = "zpWIzqFrlJ9FA5j_Ft-PHOmxQyqiW4WR-_5FDeQRbSH4JNa2tTb59xSwgiHuVcXGMGGjEdUcH7M0rkw7MSVGUnz5H7CksaSpfxNl_LZdCjDeEM8QpUmMY4PKM5diqeDgsSHYoizZ2o5ddf8OCbJwAUm9LtbR3npEUSt2RdFNZCK5zLGhZhReCsr5y97cxI3xMOpwodqzjcGKvXeWA27l2ZdWUhaZQqcTuzuqcviSvCbnPQqttq6auepdFAjVyewiaMr12d7xGwR4qxJeFe3Cq1nD4LKC1cBsB3NmCR4HukSxNqe_D7oNaGRLm9p696JzhTx10HvRUQaeXLajzxXjLQ";

pub const ROGUE_KEY_MODULUS: &str = "ilaBIdMnrUiNG1iTgQ4yYkXqX7DiTDVHohsBiXF6byx3vH9rBUXdE7u8xSEnGTkO-P1zr2nMG_o9-Ph2DnH3pVMyOfgNFR7dfL1_0RWIa1Ft3Bq7RxrswrjPekf7lm8gLM8UcDZDr9He5E5p9Tcrpt3qcm1cS_LpgK7--eTB-51LapTaqApzhBdGqIPErCWZrrLC-VbvD7UiaGO5_Q8bT1v4s1LbU04CNKxkJsvEveEzE5WJvF6f2MqtMXJWyZVRVWJ3r-pEk73Cn9mtGQbR-T3sxQBo5KfhtaNCw0LxmR41BLlkGiAH-DAv-a_GSVNSfQB7XtpzrXAlcG--d_Hv_w";

const FEDERATION_SECRET: &[u8] = b"federation-test-secret";

/// RSA signing JWK with the standard exponent.
pub fn jwk(kid: &str, modulus: &str) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": modulus,
        "e": "AQAB",
    })
}

pub fn jwks(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}

/// Key set publishing only the signing fixture under [`TEST_KID`].
pub fn default_jwks() -> Value {
    jwks(vec![jwk(TEST_KID, SIGNING_KEY_MODULUS)])
}

/// Claims valid for the next hour.
pub fn claims(sub: &str) -> Map<String, Value> {
    let now = Utc::now();
    let mut claims = Map::new();
    claims.insert("sub".into(), json!(sub));
    claims.insert("iat".into(), json!(now.timestamp()));
    claims.insert(
        "exp".into(),
        json!((now + ChronoDuration::hours(1)).timestamp()),
    );
    claims
}

/// Builder for RS256 identity-provider tokens.
pub struct TokenBuilder {
    kid: Option<String>,
    key_pem: &'static str,
    claims: Map<String, Value>,
}

impl Default for TokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBuilder {
    pub fn new() -> Self {
        Self {
            kid: Some(TEST_KID.to_string()),
            key_pem: SIGNING_KEY_PEM,
            claims: claims("user@example.com"),
        }
    }

    pub fn subject(self, sub: &str) -> Self {
        self.claim("sub", json!(sub))
    }

    pub fn kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self
    }

    pub fn signed_with(mut self, key_pem: &'static str) -> Self {
        self.key_pem = key_pem;
        self
    }

    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    pub fn remove_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Set `exp` relative to now; negative values produce an expired token.
    pub fn expires_in(self, secs: i64) -> Self {
        let exp = Utc::now().timestamp() + secs;
        self.claim("exp", json!(exp))
    }

    pub fn build(self) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.kid;
        let key = EncodingKey::from_rsa_pem(self.key_pem.as_bytes()).expect("fixture key parses");
        encode(&header, &self.claims, &key).expect("token encodes")
    }
}

/// Federated token carrying `context` as the identity context claim.
pub fn federated_token(context: Option<&str>) -> String {
    let mut claims = json!({
        "sub": "user@example.com",
        "aud": "identity-center",
    });
    if let Some(context) = context {
        claims[IDENTITY_CONTEXT_CLAIM] = json!(context);
    }
    federated_token_with_claims(claims)
}

pub fn federated_token_with_claims(claims: Value) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(FEDERATION_SECRET),
    )
    .expect("federated token encodes")
}

/// Valid configuration pointing at `jwks_uri`, with a short call timeout.
pub fn test_config(jwks_uri: &str) -> BrokerConfig {
    BrokerConfig {
        idp_app_arn: "arn:aws:sso::123456789012:application/ssoins-test/apl-test".to_string(),
        identity_bearer_role_arn: "arn:aws:iam::123456789012:role/IdentityBearer".to_string(),
        region: "us-east-1".to_string(),
        jwks_uri: Url::parse(jwks_uri).expect("test jwks uri parses"),
        jwt_algorithm: Algorithm::RS256,
        expected_issuer: None,
        expected_audience: None,
        clock_skew_secs: 0,
        call_timeout_secs: 1,
        federation_endpoint_url: None,
        sts_endpoint_url: None,
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

fn sdk_test_timeouts() -> TimeoutConfig {
    TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(1))
        .operation_timeout(Duration::from_secs(2))
        .build()
}

/// STS client with static credentials and no retries, aimed at `endpoint`.
pub fn sts_client(endpoint: &str) -> aws_sdk_sts::Client {
    let config = aws_sdk_sts::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(aws_sdk_sts::config::Credentials::new(
            "AKIDVENDTEST",
            "vend-test-secret",
            None,
            None,
            "vend-test",
        ))
        .endpoint_url(endpoint)
        .timeout_config(sdk_test_timeouts())
        .retry_config(RetryConfig::disabled())
        .build();
    aws_sdk_sts::Client::from_conf(config)
}

/// Identity-center OIDC client with static credentials and no retries,
/// aimed at `endpoint`.
pub fn oidc_client(endpoint: &str) -> aws_sdk_ssooidc::Client {
    let config = aws_sdk_ssooidc::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(aws_sdk_ssooidc::config::Credentials::new(
            "AKIDVENDTEST",
            "vend-test-secret",
            None,
            None,
            "vend-test",
        ))
        .endpoint_url(endpoint)
        .timeout_config(sdk_test_timeouts())
        .retry_config(RetryConfig::disabled())
        .build();
    aws_sdk_ssooidc::Client::from_conf(config)
}

/// Behaviour of [`FakeFederation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FederationMode {
    /// Return a token carrying this identity context.
    WithContext(String),
    /// Return a token without the identity context claim.
    WithoutContext,
    Reject,
    Unavailable,
    /// Never answer.
    Hang,
}

/// In-process federation endpoint that counts its calls.
pub struct FakeFederation {
    mode: FederationMode,
    calls: AtomicUsize,
    subjects: Mutex<Vec<Option<String>>>,
}

impl FakeFederation {
    pub fn new(mode: FederationMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            subjects: Mutex::new(Vec::new()),
        }
    }

    pub fn with_context(context: &str) -> Self {
        Self::new(FederationMode::WithContext(context.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Subjects of the verified tokens received, in call order.
    pub fn subjects(&self) -> Vec<Option<String>> {
        self.subjects.lock().expect("subjects lock").clone()
    }
}

#[async_trait]
impl FederationExchanger for FakeFederation {
    async fn exchange(&self, token: &VerifiedToken) -> Result<FederatedToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.subjects
            .lock()
            .expect("subjects lock")
            .push(token.subject().map(str::to_string));

        match &self.mode {
            FederationMode::WithContext(context) => {
                FederatedToken::from_federation_response(federated_token(Some(context)))
            }
            FederationMode::WithoutContext => {
                FederatedToken::from_federation_response(federated_token(None))
            }
            FederationMode::Reject => Err(Error::FederationRejected(
                "CreateTokenWithIAM was rejected (InvalidGrantException)".to_string(),
            )),
            FederationMode::Unavailable => Err(Error::FederationUnavailable(
                "CreateTokenWithIAM failed upstream (InternalServerException)".to_string(),
            )),
            FederationMode::Hang => std::future::pending().await,
        }
    }
}

/// Behaviour of [`FakeRoleAssumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleMode {
    /// Issue distinct credentials on every call.
    Issue,
    /// Issue credentials whose expiration is already behind the local clock.
    IssueLapsed,
    /// Issue credentials with an empty session token.
    IssueIncomplete,
    Reject,
    Unavailable,
    Hang,
}

/// In-process role assumer that counts its calls.
pub struct FakeRoleAssumer {
    mode: RoleMode,
    calls: AtomicUsize,
    contexts: Mutex<Vec<String>>,
}

impl FakeRoleAssumer {
    pub fn new(mode: RoleMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identity contexts received, in call order.
    pub fn contexts(&self) -> Vec<String> {
        self.contexts.lock().expect("contexts lock").clone()
    }
}

#[async_trait]
impl RoleAssumer for FakeRoleAssumer {
    async fn assume_role(&self, context: &IdentityContext) -> Result<TemporaryCredentials> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.contexts
            .lock()
            .expect("contexts lock")
            .push(context.as_str().to_string());

        let issued = TemporaryCredentials {
            access_key_id: format!("ASIATESTKEY{:08}", call),
            secret_access_key: format!("test-secret-{}", call),
            session_token: format!("test-session-{}", call),
            expiration: Utc::now() + ChronoDuration::minutes(15),
        };

        match self.mode {
            RoleMode::Issue => Ok(issued),
            RoleMode::IssueLapsed => Ok(TemporaryCredentials {
                expiration: Utc::now() - ChronoDuration::minutes(1),
                ..issued
            }),
            RoleMode::IssueIncomplete => Ok(TemporaryCredentials {
                session_token: String::new(),
                ..issued
            }),
            RoleMode::Reject => Err(Error::AssumeRoleRejected(
                "AssumeRole was rejected (AccessDenied)".to_string(),
            )),
            RoleMode::Unavailable => Err(Error::AssumeRoleUnavailable(
                "AssumeRole timed out".to_string(),
            )),
            RoleMode::Hang => std::future::pending().await,
        }
    }
}
