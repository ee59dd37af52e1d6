//! Key-set endpoint fixtures.

use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub use vend_auth::testutil::{
    FederationMode, ROGUE_KEY_MODULUS, ROGUE_KEY_PEM, RoleMode, SIGNING_KEY_MODULUS,
    SIGNING_KEY_PEM, TEST_KID, TokenBuilder, default_jwks, jwk, jwks,
};

pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Serve `body` as the key set.
pub async fn mount_jwks(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Serve the key set, failing if it is fetched more than `max_fetches` times.
pub async fn mount_jwks_expecting(server: &MockServer, body: Value, max_fetches: u64) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1..=max_fetches)
        .mount(server)
        .await;
}

/// Key-set endpoint answering every request with `status`.
pub async fn mount_failing_jwks(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
