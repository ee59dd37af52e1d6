//! STS role assumption with an identity-center provided context.

use super::{IdentityContext, RoleAssumer, UpstreamFailure, classify_sdk_error};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sts::Client;
use aws_sdk_sts::types::ProvidedContext;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use vend_core::config::{CONTEXT_PROVIDER_ARN, ROLE_SESSION_NAME, SESSION_DURATION_SECS};
use vend_core::{BrokerConfig, Error, Result, TemporaryCredentials};

/// Assumes the identity bearer role via `AssumeRole`.
pub struct StsRoleAssumer {
    client: Client,
    role_arn: String,
}

impl StsRoleAssumer {
    pub fn new(client: Client, role_arn: impl Into<String>) -> Self {
        Self {
            client,
            role_arn: role_arn.into(),
        }
    }

    pub fn from_sdk_config(sdk_config: &SdkConfig, config: &BrokerConfig) -> Self {
        let mut builder = aws_sdk_sts::config::Builder::from(sdk_config);
        if let Some(ref endpoint) = config.sts_endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        Self::new(Client::from_conf(builder.build()), &config.identity_bearer_role_arn)
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(&self, context: &IdentityContext) -> Result<TemporaryCredentials> {
        debug!(role_arn = %self.role_arn, "Assuming identity bearer role");

        let provided_context = ProvidedContext::builder()
            .provider_arn(CONTEXT_PROVIDER_ARN)
            .context_assertion(context.as_str())
            .build();

        let output = self
            .client
            .assume_role()
            .role_arn(&self.role_arn)
            .role_session_name(ROLE_SESSION_NAME)
            .duration_seconds(SESSION_DURATION_SECS)
            .provided_contexts(provided_context)
            .send()
            .await
            .map_err(|e| match classify_sdk_error("AssumeRole", &e) {
                UpstreamFailure::Rejected(detail) => Error::AssumeRoleRejected(detail),
                UpstreamFailure::Unavailable(detail) => Error::AssumeRoleUnavailable(detail),
            })?;

        let Some(creds) = output.credentials() else {
            warn!(role_arn = %self.role_arn, "AssumeRole succeeded without credentials");
            return Err(Error::AssumeRoleRejected(
                "Failed to assume role with provided context".to_string(),
            ));
        };

        let expiration = creds.expiration();
        let expiration: DateTime<Utc> =
            DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos()).ok_or_else(
                || Error::Internal("role credentials carry an out-of-range expiration".to_string()),
            )?;

        Ok(TemporaryCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
            expiration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FederatedToken;
    use crate::testutil::{self, FakeFederation, TokenBuilder};
    use crate::{KeyResolver, TokenExchangeBroker, TokenVerifier};
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration;
    use vend_core::{ExchangeStage, FailureKind, IncomingRequest};
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/IdentityBearer";

    fn context() -> IdentityContext {
        let token =
            FederatedToken::from_federation_response(testutil::federated_token(Some("ctx-assertion")))
                .unwrap();
        IdentityContext::from_federated(&token).unwrap()
    }

    fn assume_role_response(result: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<AssumeRoleResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleResult>{result}</AssumeRoleResult>
  <ResponseMetadata><RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId></ResponseMetadata>
</AssumeRoleResponse>"#
            ),
            "text/xml",
        )
    }

    fn access_denied() -> ResponseTemplate {
        ResponseTemplate::new(403).set_body_raw(
            r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <Error>
    <Type>Sender</Type>
    <Code>AccessDenied</Code>
    <Message>User is not authorized to perform: sts:AssumeRole</Message>
  </Error>
  <RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId>
</ErrorResponse>"#,
            "text/xml",
        )
    }

    const ISSUED_CREDENTIALS: &str = r#"<Credentials>
      <AccessKeyId>ASIAVENDEXAMPLE</AccessKeyId>
      <SecretAccessKey>wJalrXUtnFEMIK7MDENG</SecretAccessKey>
      <SessionToken>FwoGZXIvYXdzEBYaDH</SessionToken>
      <Expiration>2030-01-01T00:15:00Z</Expiration>
    </Credentials>"#;

    #[tokio::test]
    async fn test_assume_role_sends_provided_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Action=AssumeRole"))
            .and(body_string_contains("RoleSessionName=IdentityBearerRoleSession"))
            .and(body_string_contains("DurationSeconds=900"))
            .and(body_string_contains("ContextAssertion=ctx-assertion"))
            .respond_with(assume_role_response(ISSUED_CREDENTIALS))
            .expect(1)
            .mount(&server)
            .await;

        let assumer = StsRoleAssumer::new(testutil::sts_client(&server.uri()), ROLE_ARN);
        let credentials = assumer.assume_role(&context()).await.unwrap();

        assert_eq!(credentials.access_key_id, "ASIAVENDEXAMPLE");
        assert_eq!(credentials.secret_access_key, "wJalrXUtnFEMIK7MDENG");
        assert_eq!(credentials.session_token, "FwoGZXIvYXdzEBYaDH");
        assert_eq!(
            credentials.expiration,
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 15, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_access_denied_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(access_denied())
            .mount(&server)
            .await;

        let assumer = StsRoleAssumer::new(testutil::sts_client(&server.uri()), ROLE_ARN);
        let err = assumer.assume_role(&context()).await.unwrap_err();

        match err {
            Error::AssumeRoleRejected(detail) => {
                assert_eq!(detail, "AssumeRole was rejected (AccessDenied)")
            }
            other => panic!("expected AssumeRoleRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_response_without_credentials_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(assume_role_response(""))
            .mount(&server)
            .await;

        let assumer = StsRoleAssumer::new(testutil::sts_client(&server.uri()), ROLE_ARN);
        assert!(matches!(
            assumer.assume_role(&context()).await,
            Err(Error::AssumeRoleRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let assumer = StsRoleAssumer::new(testutil::sts_client(&format!("http://{addr}")), ROLE_ARN);
        assert!(matches!(
            assumer.assume_role(&context()).await,
            Err(Error::AssumeRoleUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_broker_reports_access_denied_as_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(testutil::default_jwks()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(access_denied())
            .expect(1)
            .mount(&server)
            .await;

        let config = testutil::test_config(&format!("{}/keys", server.uri()));
        let resolver = Arc::new(KeyResolver::from_config(&config).unwrap());
        let broker = TokenExchangeBroker::new(
            TokenVerifier::new(resolver, &config),
            Arc::new(FakeFederation::with_context("ctx-assertion")),
            Arc::new(StsRoleAssumer::new(
                testutil::sts_client(&server.uri()),
                ROLE_ARN,
            )),
            Duration::from_secs(5),
        );

        let failure = broker
            .exchange(&IncomingRequest::new(TokenBuilder::new().build()))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::AssumeRoleRejected);
        assert_eq!(failure.stage, ExchangeStage::AssumingRole);
    }
}
