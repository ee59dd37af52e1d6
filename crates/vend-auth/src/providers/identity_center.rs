//! Identity-center JWT-bearer token exchange.

use super::{FederatedToken, FederationExchanger, UpstreamFailure, classify_sdk_error};
use crate::jwt::VerifiedToken;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ssooidc::Client;
use tracing::{debug, warn};
use vend_core::config::JWT_BEARER_GRANT_TYPE;
use vend_core::{BrokerConfig, Error, Result};

/// Exchanges verified tokens through `CreateTokenWithIAM`.
pub struct IdentityCenterExchanger {
    client: Client,
    application_arn: String,
}

impl IdentityCenterExchanger {
    pub fn new(client: Client, application_arn: impl Into<String>) -> Self {
        Self {
            client,
            application_arn: application_arn.into(),
        }
    }

    pub fn from_sdk_config(sdk_config: &SdkConfig, config: &BrokerConfig) -> Self {
        let mut builder = aws_sdk_ssooidc::config::Builder::from(sdk_config);
        if let Some(ref endpoint) = config.federation_endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        Self::new(Client::from_conf(builder.build()), &config.idp_app_arn)
    }
}

#[async_trait]
impl FederationExchanger for IdentityCenterExchanger {
    async fn exchange(&self, token: &VerifiedToken) -> Result<FederatedToken> {
        debug!(
            application = %self.application_arn,
            sub = ?token.subject(),
            "Exchanging identity provider token for identity-center token"
        );

        let output = self
            .client
            .create_token_with_iam()
            .client_id(&self.application_arn)
            .grant_type(JWT_BEARER_GRANT_TYPE)
            .assertion(token.raw())
            .send()
            .await
            .map_err(|e| match classify_sdk_error("CreateTokenWithIAM", &e) {
                UpstreamFailure::Rejected(detail) => Error::FederationRejected(detail),
                UpstreamFailure::Unavailable(detail) => Error::FederationUnavailable(detail),
            })?;

        let Some(id_token) = output.id_token() else {
            warn!("CreateTokenWithIAM succeeded without an id token");
            return Err(Error::FederationRejected(
                "federation response contained no id token".to_string(),
            ));
        };

        FederatedToken::from_federation_response(id_token)
    }
}
