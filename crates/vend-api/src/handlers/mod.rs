//! Request handlers.

pub mod exchange;
pub mod health;
