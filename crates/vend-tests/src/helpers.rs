//! Test helper functions and utilities.

use reqwest::Client;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use vend_api::{AppState, build_app};

/// Start the HTTP surface on an ephemeral port and return its address.
pub async fn start_test_server(
    state: Arc<AppState>,
) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let app = build_app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Test server stopped");
        }
    });

    Ok((addr, handle))
}

/// Create an HTTP client for testing.
pub fn test_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create test client")
}

/// Client for the exchange surface with a fixed base URL.
pub struct ApiTestClient {
    client: Client,
    base_url: String,
}

impl ApiTestClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            client: test_client(),
            base_url: format!("http://{}", addr),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client.get(self.url(path)).send().await
    }

    /// `GET /exchange` with the token in `X-Idtoken`.
    pub async fn exchange_with_header(&self, token: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(self.url("/exchange"))
            .header("X-Idtoken", token)
            .send()
            .await
    }

    /// `POST /exchange` with a request event body.
    pub async fn exchange_with_event(&self, event: &Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(self.url("/exchange"))
            .json(event)
            .send()
            .await
    }

    /// Check health endpoint.
    pub async fn health(&self) -> anyhow::Result<bool> {
        let resp = self.get("/health").await?;
        Ok(resp.status().is_success())
    }
}

/// Request event in the gateway's JSON shape.
pub fn exchange_event(token: &str) -> Value {
    serde_json::json!({
        "idToken": token,
        "path": "/exchange",
        "httpMethod": "POST",
    })
}

/// Assert that a future completes within a timeout.
pub async fn assert_completes_within<F, T>(future: F, timeout: Duration) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(timeout, future)
        .await
        .expect("Operation timed out")
}
