//! Application state shared across handlers.

use std::sync::Arc;
use vend_auth::TokenExchangeBroker;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<TokenExchangeBroker>,
}

impl AppState {
    pub fn new(broker: Arc<TokenExchangeBroker>) -> Self {
        Self { broker }
    }
}
