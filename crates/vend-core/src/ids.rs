//! Per-request trace identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier correlating every log line of one exchange, across all three
/// upstream calls, with the failure response returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Reuse a W3C trace id (32 hex chars) so gateway and broker logs line up.
    pub fn from_trace_id(trace_id: &str) -> Option<Self> {
        if trace_id.len() != 32 || trace_id.bytes().all(|b| b == b'0') {
            return None;
        }
        Uuid::parse_str(trace_id).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req_{}", self.0.simple())
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let uuid_str = s.strip_prefix("req_").unwrap_or(s);
        Ok(Self(Uuid::parse_str(uuid_str)?))
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for RequestId {
    type Error = uuid::Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}
