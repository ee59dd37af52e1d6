//! Verification of identity-provider tokens.

use crate::jwks::KeyResolver;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use vend_core::{BrokerConfig, Error, Result};

/// Decoded claims of a token that passed signature verification.
pub type VerifiedClaims = Map<String, Value>;

/// A token whose signature and time claims have been checked.
///
/// Only [`TokenVerifier::verify`] can produce one, so anything accepting a
/// `&VerifiedToken` cannot be handed an unchecked string by mistake.
pub struct VerifiedToken {
    raw: String,
    claims: VerifiedClaims,
}

impl VerifiedToken {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &VerifiedClaims {
        &self.claims
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }
}

impl fmt::Debug for VerifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedToken")
            .field("sub", &self.subject())
            .finish_non_exhaustive()
    }
}

/// JWT verifier for identity-provider tokens.
pub struct TokenVerifier {
    resolver: Arc<KeyResolver>,
    algorithm: Algorithm,
    validation: Validation,
}

impl TokenVerifier {
    /// The accepted algorithm comes from configuration; the token's own
    /// `alg` header is never trusted.
    pub fn new(resolver: Arc<KeyResolver>, config: &BrokerConfig) -> Self {
        let mut validation = Validation::new(config.jwt_algorithm);
        validation.leeway = config.clock_skew_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);

        if let Some(ref issuer) = config.expected_issuer {
            validation.set_issuer(&[issuer]);
        }
        match config.expected_audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            resolver,
            algorithm: config.jwt_algorithm,
            validation,
        }
    }

    /// Verify `token` and return its trusted claims.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken> {
        let header = decode_header(token)
            .map_err(|_| Error::MalformedToken("token could not be parsed".to_string()))?;

        let kid = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(Error::MissingKeyId)?;

        debug!(kid = %kid, alg = ?header.alg, "Verifying token");

        let key = self.resolver.resolve(kid).await?;

        if let Some(key_alg) = key.algorithm
            && key_alg != self.algorithm
        {
            return Err(Error::SignatureInvalid(
                "signing key algorithm does not match the expected algorithm".to_string(),
            ));
        }

        let token_data = decode::<VerifiedClaims>(token, &key.decoding_key, &self.validation)
            .map_err(|e| classify(e.kind()))?;

        Ok(VerifiedToken {
            raw: token.to_string(),
            claims: token_data.claims,
        })
    }
}

fn classify(kind: &ErrorKind) -> Error {
    match kind {
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => Error::MalformedToken("token could not be decoded".to_string()),
        ErrorKind::MissingRequiredClaim(claim) => {
            Error::MalformedToken(format!("token is missing required claim '{}'", claim))
        }
        ErrorKind::ExpiredSignature => Error::SignatureInvalid("token expired".to_string()),
        ErrorKind::ImmatureSignature => Error::SignatureInvalid("token not yet valid".to_string()),
        ErrorKind::InvalidIssuer => Error::SignatureInvalid("unexpected token issuer".to_string()),
        ErrorKind::InvalidAudience => {
            Error::SignatureInvalid("unexpected token audience".to_string())
        }
        ErrorKind::InvalidAlgorithm => {
            Error::SignatureInvalid("unexpected token algorithm".to_string())
        }
        _ => Error::SignatureInvalid("Invalid token".to_string()),
    }
}
