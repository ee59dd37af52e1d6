//! HTTP gateway surface for the token exchange broker.
//!
//! `GET /exchange` reads the token from the `X-Idtoken` header, `POST
//! /exchange` accepts a JSON request event. Both answer with temporary
//! credentials or a structured failure carrying the request id.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use routes::{build_app, create_router};
pub use state::AppState;

use tokio::net::TcpListener;
use tracing::info;

/// Serve `state` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: std::sync::Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Token exchange broker listening");
    }
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown)
        .await
}
