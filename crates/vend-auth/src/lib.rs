//! Token verification, federation and role assumption.
//!
//! [`TokenExchangeBroker`] turns a third-party identity token into
//! short-lived cloud credentials: the token is verified against the
//! provider's key set ([`jwks`], [`jwt`]), exchanged for an identity-center
//! token and finally used to assume the bearer role ([`providers`]).

pub mod broker;
pub mod jwks;
pub mod jwt;
pub mod providers;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use broker::TokenExchangeBroker;
pub use jwks::{KeyResolver, SigningKey};
pub use jwt::{TokenVerifier, VerifiedClaims, VerifiedToken};
pub use providers::{
    FederatedToken, FederationExchanger, IdentityContext, RoleAssumer,
    identity_center::IdentityCenterExchanger, load_sdk_config, sts::StsRoleAssumer,
};
