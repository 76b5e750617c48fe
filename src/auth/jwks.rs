//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! Keys are indexed by `kid` and refreshed after a TTL. When a refresh fails,
//! keys from a previous successful fetch keep being served for up to
//! [`MAX_STALE_CACHE_SECONDS`] if stale use is allowed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default cache TTL in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Maximum stale cache age in seconds (24 hours).
pub const MAX_STALE_CACHE_SECONDS: u64 = 86400;

/// JWKS document. Keys are parsed one by one so a single unsupported key does
/// not discard the whole set.
#[derive(Debug, Clone, Deserialize)]
struct JwksDocument {
    keys: Vec<Value>,
}

/// Thread-safe JWKS cache with automatic refresh.
pub struct JwksCache {
    jwks_url: String,
    cache_ttl: Duration,
    allow_stale: bool,
    keys: Arc<RwLock<HashMap<String, DecodingKey>>>,
    last_fetch: Arc<RwLock<Option<Instant>>>,
    client: reqwest::Client,
}

impl JwksCache {
    pub fn new(
        jwks_url: impl Into<String>,
        cache_ttl_seconds: u64,
        allow_stale: bool,
        client: reqwest::Client,
    ) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            allow_stale,
            keys: Arc::new(RwLock::new(HashMap::new())),
            last_fetch: Arc::new(RwLock::new(None)),
            client,
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Get a decoding key by key ID.
    ///
    /// Fetches from the JWKS endpoint if the cache is stale or the key is unknown.
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey, JwksError> {
        let should_refresh = {
            let last_fetch = self.last_fetch.read().await;
            match *last_fetch {
                Some(t) => t.elapsed() > self.cache_ttl,
                None => true,
            }
        };

        if !should_refresh && let Some(key) = self.get_from_cache(kid).await {
            return Ok(key);
        }

        match self.fetch_keys().await {
            Ok(()) => self
                .get_from_cache(kid)
                .await
                .ok_or_else(|| JwksError::KeyNotFound(kid.to_string())),
            Err(e) => {
                if self.allow_stale {
                    let last_fetch = self.last_fetch.read().await;
                    let stale_ok = last_fetch
                        .map(|t| t.elapsed() < Duration::from_secs(MAX_STALE_CACHE_SECONDS))
                        .unwrap_or(false);

                    if stale_ok {
                        warn!("JWKS fetch failed, using stale cache: {}", e);
                        if let Some(key) = self.get_from_cache(kid).await {
                            return Ok(key);
                        }
                    }
                }

                Err(e)
            }
        }
    }

    async fn get_from_cache(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.read().await.get(kid).cloned()
    }

    /// Fetch keys from the JWKS endpoint, replacing the cached set.
    pub async fn fetch_keys(&self) -> Result<(), JwksError> {
        debug!("Fetching JWKS from {}", self.jwks_url);

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| JwksError::Fetch(e.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(JwksError::Fetch(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwksDocument = response
            .json()
            .await
            .map_err(|e| JwksError::Parse(e.without_url().to_string()))?;

        let mut new_keys = HashMap::new();
        for raw in jwks.keys {
            let jwk: Jwk = match serde_json::from_value(raw) {
                Ok(jwk) => jwk,
                Err(e) => {
                    debug!("Skipping unsupported JWK: {}", e);
                    continue;
                }
            };

            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                debug!("Skipping encryption key");
                continue;
            }

            let Some(kid) = jwk.common.key_id.clone() else {
                debug!("Skipping JWK without kid");
                continue;
            };

            match DecodingKey::from_jwk(&jwk) {
                Ok(decoding_key) => {
                    debug!("Cached key with kid: {}", kid);
                    new_keys.insert(kid, decoding_key);
                }
                Err(e) => warn!("Failed to parse JWK: {}", e),
            }
        }

        if new_keys.is_empty() {
            return Err(JwksError::NoValidKeys);
        }

        let count = new_keys.len();
        *self.keys.write().await = new_keys;
        *self.last_fetch.write().await = Some(Instant::now());

        debug!("Successfully cached {} keys", count);
        Ok(())
    }

    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }
}

/// Errors that can occur when working with the JWKS cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwksError {
    Fetch(String),
    Parse(String),
    NoValidKeys,
    KeyNotFound(String),
}

impl std::fmt::Display for JwksError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(msg) => write!(f, "Failed to fetch JWKS: {}", msg),
            Self::Parse(msg) => write!(f, "Failed to parse JWKS: {}", msg),
            Self::NoValidKeys => write!(f, "No valid keys found in JWKS"),
            Self::KeyNotFound(kid) => write!(f, "Key not found: {}", kid),
        }
    }
}

impl std::error::Error for JwksError {}
