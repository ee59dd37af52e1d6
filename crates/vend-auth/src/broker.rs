//! Request orchestration.
//!
//! One exchange walks `Received → Verifying → Federating → AssumingRole →
//! Succeeded`. Any error short-circuits to a terminal [`ExchangeFailure`]
//! carrying the request id, the failure kind and the stage it happened in.
//! Nothing is retried and nothing is kept between requests apart from the
//! signing-key cache inside the [`KeyResolver`].

use crate::jwks::KeyResolver;
use crate::jwt::TokenVerifier;
use crate::providers::identity_center::IdentityCenterExchanger;
use crate::providers::sts::StsRoleAssumer;
use crate::providers::{FederationExchanger, IdentityContext, RoleAssumer, load_sdk_config};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, error, info, warn};
use vend_core::{
    BrokerConfig, Error, ExchangeFailure, ExchangeStage, IncomingRequest, RequestId,
    TemporaryCredentials,
};
use vend_trace::{exchange_span, record_outcome, stage_span};

type StageResult<T> = std::result::Result<T, (ExchangeStage, Error)>;

/// Stateless token exchange pipeline.
pub struct TokenExchangeBroker {
    verifier: TokenVerifier,
    federation: Arc<dyn FederationExchanger>,
    roles: Arc<dyn RoleAssumer>,
    call_timeout: Duration,
}

impl TokenExchangeBroker {
    pub fn new(
        verifier: TokenVerifier,
        federation: Arc<dyn FederationExchanger>,
        roles: Arc<dyn RoleAssumer>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            federation,
            roles,
            call_timeout,
        }
    }

    /// Wire the production key resolver and SDK-backed upstreams.
    pub async fn from_config(config: &BrokerConfig) -> vend_core::Result<Self> {
        let resolver = Arc::new(KeyResolver::from_config(config)?);
        let verifier = TokenVerifier::new(resolver, config);

        let sdk_config = load_sdk_config(config).await;
        let federation = Arc::new(IdentityCenterExchanger::from_sdk_config(&sdk_config, config));
        let roles = Arc::new(StsRoleAssumer::from_sdk_config(&sdk_config, config));

        info!(
            region = %config.region,
            jwks_uri = %config.jwks_uri,
            algorithm = ?config.jwt_algorithm,
            "Token exchange broker configured"
        );

        Ok(Self::new(verifier, federation, roles, config.call_timeout()))
    }

    /// Run one exchange under a freshly generated request id.
    pub async fn exchange(
        &self,
        request: &IncomingRequest,
    ) -> std::result::Result<TemporaryCredentials, ExchangeFailure> {
        self.exchange_with_id(RequestId::new(), request).await
    }

    /// Run one exchange, correlating logs with `request_id`.
    pub async fn exchange_with_id(
        &self,
        request_id: RequestId,
        request: &IncomingRequest,
    ) -> std::result::Result<TemporaryCredentials, ExchangeFailure> {
        let span = exchange_span(&request_id, &request.http_method, &request.path);

        match self.run(request).instrument(span.clone()).await {
            Ok(credentials) => {
                record_outcome(&span, ExchangeStage::Succeeded, "success");
                span.in_scope(|| {
                    info!(
                        access_key_id = %credentials.access_key_id,
                        expiration = %credentials.expiration,
                        "Issued temporary credentials"
                    )
                });
                Ok(credentials)
            }
            Err((stage, err)) => {
                let kind = err.kind();
                record_outcome(&span, stage, kind.as_str());
                span.in_scope(|| {
                    if kind.is_retryable() {
                        warn!(kind = %kind, stage = stage.as_str(), error = %err, "Exchange failed");
                    } else if matches!(err, Error::Internal(_) | Error::Config(_)) {
                        error!(kind = %kind, stage = stage.as_str(), error = %err, "Exchange failed");
                    } else {
                        info!(kind = %kind, stage = stage.as_str(), error = %err, "Exchange refused");
                    }
                });
                Err(ExchangeFailure {
                    request_id,
                    kind,
                    stage,
                    detail: err.to_string(),
                })
            }
        }
    }

    async fn run(&self, request: &IncomingRequest) -> StageResult<TemporaryCredentials> {
        let token = request.token().ok_or_else(|| {
            (
                ExchangeStage::Received,
                Error::MalformedToken("request carries no idToken".to_string()),
            )
        })?;

        let verified = self
            .stage(ExchangeStage::Verifying, self.verifier.verify(token), || {
                Error::KeyLookup("token verification timed out".to_string())
            })
            .await?;

        let federated = self
            .stage(
                ExchangeStage::Federating,
                self.federation.exchange(&verified),
                || Error::FederationUnavailable("federation exchange timed out".to_string()),
            )
            .await?;

        self.stage(
            ExchangeStage::AssumingRole,
            async {
                let context = IdentityContext::from_federated(&federated)?;
                self.roles.assume_role(&context).await
            },
            || Error::AssumeRoleUnavailable("role assumption timed out".to_string()),
        )
        .await
        .and_then(|credentials| {
            if credentials.is_complete() {
                Ok(credentials)
            } else {
                Err((
                    ExchangeStage::AssumingRole,
                    Error::AssumeRoleRejected(
                        "role assumption returned an incomplete credential set".to_string(),
                    ),
                ))
            }
        })
    }

    /// Run one stage under its own span, bounded by the call timeout.
    async fn stage<T, F>(
        &self,
        stage: ExchangeStage,
        work: F,
        on_timeout: impl FnOnce() -> Error,
    ) -> StageResult<T>
    where
        F: Future<Output = vend_core::Result<T>>,
    {
        tracing::Span::current().record("exchange.stage", stage.as_str());

        match tokio::time::timeout(self.call_timeout, work)
            .instrument(stage_span(stage))
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err((stage, err)),
            Err(_) => Err((stage, on_timeout())),
        }
    }
}
