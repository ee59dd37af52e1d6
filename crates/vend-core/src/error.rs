//! Error types for Vend.
//!
//! Every failure the broker can produce maps to exactly one [`FailureKind`].
//! The detail string carried by each variant is safe to hand back to the
//! caller; upstream diagnostics belong in logs, not in these messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Caller-visible failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    MalformedToken,
    MissingKeyId,
    KeyLookupError,
    SignatureInvalid,
    FederationRejected,
    FederationUnavailable,
    ContextMissing,
    AssumeRoleRejected,
    AssumeRoleUnavailable,
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MalformedToken => "MalformedToken",
            FailureKind::MissingKeyId => "MissingKeyId",
            FailureKind::KeyLookupError => "KeyLookupError",
            FailureKind::SignatureInvalid => "SignatureInvalid",
            FailureKind::FederationRejected => "FederationRejected",
            FailureKind::FederationUnavailable => "FederationUnavailable",
            FailureKind::ContextMissing => "ContextMissing",
            FailureKind::AssumeRoleRejected => "AssumeRoleRejected",
            FailureKind::AssumeRoleUnavailable => "AssumeRoleUnavailable",
            FailureKind::Unexpected => "Unexpected",
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    ///
    /// The broker itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::KeyLookupError
                | FailureKind::FederationUnavailable
                | FailureKind::AssumeRoleUnavailable
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    // Token errors
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Invalid token header; missing 'kid' field")]
    MissingKeyId,

    #[error("Signing key lookup failed: {0}")]
    KeyLookup(String),

    #[error("Invalid token: {0}")]
    SignatureInvalid(String),

    // Federation errors
    #[error("Federation rejected the token: {0}")]
    FederationRejected(String),

    #[error("Federation endpoint unavailable: {0}")]
    FederationUnavailable(String),

    // Role assumption errors
    #[error("Federated token carries no identity context")]
    ContextMissing,

    #[error("Role assumption rejected: {0}")]
    AssumeRoleRejected(String),

    #[error("Role assumption unavailable: {0}")]
    AssumeRoleUnavailable(String),

    // Startup errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The caller-visible classification of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::MalformedToken(_) => FailureKind::MalformedToken,
            Error::MissingKeyId => FailureKind::MissingKeyId,
            Error::KeyLookup(_) => FailureKind::KeyLookupError,
            Error::SignatureInvalid(_) => FailureKind::SignatureInvalid,
            Error::FederationRejected(_) => FailureKind::FederationRejected,
            Error::FederationUnavailable(_) => FailureKind::FederationUnavailable,
            Error::ContextMissing => FailureKind::ContextMissing,
            Error::AssumeRoleRejected(_) => FailureKind::AssumeRoleRejected,
            Error::AssumeRoleUnavailable(_) => FailureKind::AssumeRoleUnavailable,
            Error::Config(_) | Error::Internal(_) => FailureKind::Unexpected,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
