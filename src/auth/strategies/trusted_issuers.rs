use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::auth::credentials::{CompactJwt, ParsedAuthPayload, PayloadKind, decode_claims_unverified};
use crate::auth::error::{AuthError, AuthOutcome};
use crate::auth::identity::{AuthenticatedUser, Claims, UserIdentity};
use crate::auth::jwks::{DEFAULT_CACHE_TTL_SECONDS, JwksCache, JwksError};
use crate::auth::strategies::jwt::{parse_algorithm, verification_error};
use crate::auth::strategies::{AuthStrategy, StrategyFuture};

fn default_algorithm() -> String {
    "RS256".to_string()
}

fn default_email_claim() -> String {
    "email".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_cache_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}

fn default_allow_stale() -> bool {
    true
}

/// ID tokens issued by an allow-listed OIDC provider, verified with keys from
/// the provider's discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedIssuersConfig {
    pub issuers: Vec<String>,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_email_claim")]
    pub email_claim: String,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cache_seconds")]
    pub jwks_cache_seconds: u64,
    #[serde(default = "default_allow_stale")]
    pub allow_stale_jwks: bool,
}

impl TrustedIssuersConfig {
    pub fn new<I, S>(issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            issuers: issuers.into_iter().map(Into::into).collect(),
            algorithm: default_algorithm(),
            email_claim: default_email_claim(),
            audience: None,
            timeout_ms: default_timeout_ms(),
            jwks_cache_seconds: default_cache_seconds(),
            allow_stale_jwks: default_allow_stale(),
        }
    }
}

#[derive(Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

pub struct TrustedIssuersStrategy {
    issuers: Vec<String>,
    algorithm: Algorithm,
    email_claim: String,
    audience: Option<String>,
    timeout: Duration,
    cache_ttl_seconds: u64,
    allow_stale: bool,
    client: reqwest::Client,
    caches: RwLock<HashMap<String, Arc<JwksCache>>>,
}

impl TrustedIssuersStrategy {
    pub fn new(config: TrustedIssuersConfig) -> Result<Self, AuthError> {
        if config.issuers.is_empty() {
            return Err(AuthError::misconfigured(
                "trusted_issuers provider needs at least one issuer",
            ));
        }
        for issuer in &config.issuers {
            let url = url::Url::parse(issuer).map_err(|e| {
                AuthError::misconfigured(format!("invalid issuer '{}': {}", issuer, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AuthError::misconfigured(format!(
                    "issuer '{}' must be http or https",
                    issuer
                )));
            }
        }

        let algorithm = parse_algorithm(&config.algorithm)?;
        if config.timeout_ms == 0 {
            return Err(AuthError::misconfigured("trusted_issuers timeout_ms must be positive"));
        }
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::misconfigured(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            issuers: config.issuers,
            algorithm,
            email_claim: config.email_claim,
            audience: config.audience,
            timeout,
            cache_ttl_seconds: config.jwks_cache_seconds,
            allow_stale: config.allow_stale_jwks,
            client,
            caches: RwLock::new(HashMap::new()),
        })
    }

    /// JWKS cache for an issuer, discovering its `jwks_uri` on first use.
    async fn cache_for(&self, issuer: &str) -> Result<Arc<JwksCache>, AuthError> {
        if let Some(cache) = self.caches.read().await.get(issuer) {
            return Ok(Arc::clone(cache));
        }

        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| AuthError::unreachable(format!("discovery failed: {}", e.without_url())))?;
        if !response.status().is_success() {
            return Err(AuthError::unreachable(format!(
                "HTTP {} from discovery endpoint",
                response.status()
            )));
        }
        let document: DiscoveryDocument = response
            .json()
            .await
            .map_err(|e| AuthError::unreachable(format!("bad discovery document: {}", e.without_url())))?;

        let cache = Arc::new(JwksCache::new(
            document.jwks_uri,
            self.cache_ttl_seconds,
            self.allow_stale,
            self.client.clone(),
        ));
        let mut caches = self.caches.write().await;
        Ok(Arc::clone(caches.entry(issuer.to_string()).or_insert(cache)))
    }

    async fn verify(&self, jwt: &CompactJwt) -> Result<Claims, AuthError> {
        let unverified = decode_claims_unverified(jwt)?;
        let issuer = unverified
            .get("iss")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuthError::ClaimMissing("iss".to_string()))?;
        if !self.issuers.iter().any(|trusted| trusted == issuer) {
            return Err(AuthError::rejected("issuer is not trusted"));
        }

        let header = decode_header(jwt.as_str())
            .map_err(|e| AuthError::malformed(format!("invalid JWT header: {}", e)))?;
        if header.alg != self.algorithm {
            return Err(AuthError::SignatureInvalid(
                "token algorithm does not match the pinned one".to_string(),
            ));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::malformed("JWT header has no kid"))?;

        let key = tokio::time::timeout(self.timeout, async {
            let cache = self.cache_for(issuer).await?;
            cache.get_key(&kid).await.map_err(|e| match e {
                JwksError::KeyNotFound(kid) => {
                    AuthError::rejected(format!("no signing key with kid '{}'", kid))
                }
                other => AuthError::unreachable(other.to_string()),
            })
        })
        .await
        .map_err(|_| AuthError::unreachable("key discovery timed out"))??;

        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[issuer]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        decode::<Claims>(jwt.as_str(), &key, &validation)
            .map(|data| data.claims)
            .map_err(verification_error)
    }
}

impl AuthStrategy for TrustedIssuersStrategy {
    fn name(&self) -> &'static str {
        "trusted_issuers"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::IdToken
    }

    fn validate<'a>(&'a self, payload: &'a ParsedAuthPayload) -> StrategyFuture<'a> {
        Box::pin(async move {
            let jwt = match payload.id_token() {
                Ok(Some(jwt)) => jwt,
                Ok(None) => return AuthOutcome::Unauthenticated,
                Err(err) => return AuthOutcome::Invalid(err),
            };

            self.verify(&jwt)
                .await
                .and_then(|claims| UserIdentity::from_claims(claims, &self.email_claim))
                .map(|identity| AuthenticatedUser::new(identity, payload.connector_tokens()))
                .into()
        })
    }
}
