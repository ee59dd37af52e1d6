//! Boundary-facing request and failure shapes.

use crate::error::FailureKind;
use crate::ids::RequestId;
use serde::{Deserialize, Serialize};

/// One exchange invocation as forwarded by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRequest {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub http_method: String,
}

impl IncomingRequest {
    pub fn new(id_token: impl Into<String>) -> Self {
        Self {
            id_token: Some(id_token.into()),
            path: "/exchange".to_string(),
            http_method: "GET".to_string(),
        }
    }

    /// The bearer token, if one was supplied and is non-blank.
    pub fn token(&self) -> Option<&str> {
        self.id_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Broker pipeline stage. `Failed` is terminal and reachable from any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStage {
    Received,
    Verifying,
    Federating,
    AssumingRole,
    Succeeded,
}

impl ExchangeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeStage::Received => "received",
            ExchangeStage::Verifying => "verifying",
            ExchangeStage::Federating => "federating",
            ExchangeStage::AssumingRole => "assuming_role",
            ExchangeStage::Succeeded => "succeeded",
        }
    }
}

/// Terminal `Failed(kind)` state of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeFailure {
    pub request_id: RequestId,
    pub kind: FailureKind,
    /// Last stage entered before the failure.
    pub stage: ExchangeStage,
    pub detail: String,
}

impl ExchangeFailure {
    pub fn to_response(&self) -> FailureResponse {
        FailureResponse {
            request_id: self.request_id.to_string(),
            message: self.kind.as_str().to_string(),
            details: self.detail.clone(),
        }
    }
}

impl std::fmt::Display for ExchangeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} during {}: {}",
            self.request_id,
            self.kind,
            self.stage.as_str(),
            self.detail
        )
    }
}

impl std::error::Error for ExchangeFailure {}

/// Failure body returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    pub request_id: String,
    pub message: String,
    pub details: String,
}
