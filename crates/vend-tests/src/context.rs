//! Test context wiring a live server to substitute backends.

use crate::fixtures::{JWKS_PATH, default_jwks, mount_jwks};
use crate::helpers::{ApiTestClient, start_test_server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use vend_api::AppState;
use vend_auth::testutil::{self, FakeFederation, FakeRoleAssumer, FederationMode, RoleMode};
use vend_auth::{KeyResolver, TokenExchangeBroker, TokenVerifier};
use vend_core::BrokerConfig;
use wiremock::MockServer;

/// Running server plus handles on everything behind it.
///
/// Drop this to stop the mock key-set endpoint; request expectations
/// mounted on it are verified at that point.
pub struct TestContext {
    pub jwks_server: MockServer,
    pub federation: Arc<FakeFederation>,
    pub roles: Arc<FakeRoleAssumer>,
    pub config: BrokerConfig,
    pub addr: SocketAddr,
    pub client: ApiTestClient,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestContext {
    pub fn builder() -> TestContextBuilder {
        TestContextBuilder::default()
    }

    /// Context with happy-path backends.
    pub async fn new() -> anyhow::Result<Self> {
        Self::builder().start().await
    }

    pub fn valid_token(&self) -> String {
        testutil::TokenBuilder::new().build()
    }
}

pub struct TestContextBuilder {
    federation: FederationMode,
    roles: RoleMode,
    call_timeout: Duration,
    mount_default_jwks: bool,
}

impl Default for TestContextBuilder {
    fn default() -> Self {
        Self {
            federation: FederationMode::WithContext("test-identity-context".to_string()),
            roles: RoleMode::Issue,
            call_timeout: Duration::from_secs(1),
            mount_default_jwks: true,
        }
    }
}

impl TestContextBuilder {
    pub fn federation(mut self, mode: FederationMode) -> Self {
        self.federation = mode;
        self
    }

    pub fn roles(mut self, mode: RoleMode) -> Self {
        self.roles = mode;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Leave the key-set endpoint empty so the test can mount its own.
    pub fn without_default_jwks(mut self) -> Self {
        self.mount_default_jwks = false;
        self
    }

    pub async fn start(self) -> anyhow::Result<TestContext> {
        crate::init_test_logging();

        let jwks_server = MockServer::start().await;
        if self.mount_default_jwks {
            mount_jwks(&jwks_server, default_jwks()).await;
        }

        let config = testutil::test_config(&format!("{}{}", jwks_server.uri(), JWKS_PATH));
        let resolver = Arc::new(KeyResolver::from_config(&config)?);
        let federation = Arc::new(FakeFederation::new(self.federation));
        let roles = Arc::new(FakeRoleAssumer::new(self.roles));

        let broker = TokenExchangeBroker::new(
            TokenVerifier::new(resolver, &config),
            federation.clone(),
            roles.clone(),
            self.call_timeout,
        );

        let state = Arc::new(AppState::new(Arc::new(broker)));
        let (addr, handle) = start_test_server(state).await?;

        Ok(TestContext {
            jwks_server,
            federation,
            roles,
            config,
            addr,
            client: ApiTestClient::new(addr),
            _handle: handle,
        })
    }
}
