//! Vend Core
//!
//! Shared vocabulary for the token exchange broker: the failure taxonomy,
//! request identifiers, configuration and the boundary-facing wire types.
//! This crate has minimal dependencies and performs no I/O beyond reading
//! configuration at startup.

pub mod config;
pub mod credentials;
pub mod error;
pub mod exchange;
pub mod ids;

pub use config::BrokerConfig;
pub use credentials::TemporaryCredentials;
pub use error::{Error, FailureKind, Result};
pub use exchange::{ExchangeFailure, ExchangeStage, FailureResponse, IncomingRequest};
pub use ids::RequestId;
