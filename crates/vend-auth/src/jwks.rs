//! Signing key resolution from a remote JWKS endpoint.
//!
//! Keys are memoized by `kid` for the life of the process. There is no TTL
//! or eviction: the upstream key set is small and rotates rarely, and a
//! rotated-in key is simply a cache miss for its new `kid`.

use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{Instrument, debug, info, warn};
use url::Url;
use vend_core::{BrokerConfig, Error, Result};

/// Public verification key for one `kid`.
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    /// Algorithm advertised by the JWK, when present.
    pub algorithm: Option<Algorithm>,
    pub decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Key set document. Entries stay raw so one unsupported key does not
/// make the whole set unreadable.
#[derive(Debug, Deserialize)]
struct RawKeySet {
    keys: Vec<Value>,
}

/// Resolves and caches signing keys by key identifier.
pub struct KeyResolver {
    jwks_uri: Url,
    http_client: reqwest::Client,
    keys: RwLock<HashMap<String, Arc<SigningKey>>>,
}

impl KeyResolver {
    pub fn new(jwks_uri: Url, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            jwks_uri,
            http_client,
            keys: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &BrokerConfig) -> Result<Self> {
        Self::new(config.jwks_uri.clone(), config.call_timeout())
    }

    /// Get the signing key for `kid`, fetching the key set on a cache miss.
    ///
    /// Concurrent misses for the same `kid` may each fetch; the first
    /// inserted key wins and every caller gets that one.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>> {
        {
            let keys = self.keys.read().await;
            if let Some(key) = keys.get(kid) {
                return Ok(key.clone());
            }
        }

        debug!(kid = %kid, "Signing key not cached, fetching key set");
        let fetched = Arc::new(
            self.fetch(kid)
                .instrument(vend_trace::key_fetch_span(kid))
                .await?,
        );

        let mut keys = self.keys.write().await;
        let key = keys.entry(kid.to_string()).or_insert(fetched).clone();
        info!(kid = %kid, cached_keys = keys.len(), "Signing key cached");
        Ok(key)
    }

    /// Number of cached keys.
    pub async fn cached_len(&self) -> usize {
        self.keys.read().await.len()
    }

    async fn fetch(&self, kid: &str) -> Result<SigningKey> {
        let response = self
            .http_client
            .get(self.jwks_uri.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(url = %self.jwks_uri, error = %e, "Key set request failed");
                if e.is_timeout() {
                    Error::KeyLookup("key set request timed out".to_string())
                } else {
                    Error::KeyLookup("key set endpoint unreachable".to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.jwks_uri, status = %status, "Key set endpoint returned an error");
            return Err(Error::KeyLookup(format!(
                "key set endpoint returned status {}",
                status.as_u16()
            )));
        }

        let key_set: RawKeySet = response.json().await.map_err(|e| {
            warn!(url = %self.jwks_uri, error = %e, "Key set response is not a JWKS document");
            Error::KeyLookup("key set response could not be parsed".to_string())
        })?;

        let entry = key_set
            .keys
            .iter()
            .find(|jwk| jwk.get("kid").and_then(Value::as_str) == Some(kid))
            .ok_or_else(|| Error::KeyLookup(format!("signing key '{}' not found in key set", kid)))?;

        Self::to_signing_key(kid, entry).map_err(|reason| {
            warn!(kid = %kid, reason = %reason, "Unusable key in key set");
            Error::KeyLookup(format!("signing key '{}' is unusable: {}", kid, reason))
        })
    }

    fn to_signing_key(kid: &str, entry: &Value) -> std::result::Result<SigningKey, String> {
        if entry.get("use").and_then(Value::as_str) == Some("enc") {
            return Err("key is marked for encryption".to_string());
        }

        let algorithm = match entry.get("alg").and_then(Value::as_str) {
            Some(name) => Some(
                Algorithm::from_str(name)
                    .map_err(|_| format!("'{}' is not a signing algorithm", name))?,
            ),
            None => None,
        };

        let jwk: Jwk = serde_json::from_value(entry.clone()).map_err(|e| e.to_string())?;
        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| e.to_string())?;

        Ok(SigningKey {
            key_id: kid.to_string(),
            algorithm,
            decoding_key,
        })
    }
}
