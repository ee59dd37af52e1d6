//! End-to-end test infrastructure for Vend.
//!
//! Starts the real HTTP surface on an ephemeral port, backed by a
//! `wiremock` key-set endpoint and in-process federation and role
//! assumption fakes.
//!
//! # Usage
//!
//! ```ignore
//! use vend_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::builder().start().await.unwrap();
//!     let resp = ctx.client.exchange_with_header(&ctx.valid_token()).await.unwrap();
//! }
//! ```

pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::{TestContext, TestContextBuilder};
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,vend_auth=debug,vend_tests=debug")),
        )
        .with_test_writer()
        .try_init();
}
