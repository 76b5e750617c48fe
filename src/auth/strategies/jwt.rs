use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::auth::credentials::{ParsedAuthPayload, PayloadKind};
use crate::auth::error::{AuthError, AuthOutcome};
use crate::auth::identity::{AuthenticatedUser, Claims, UserIdentity};
use crate::auth::strategies::{AuthStrategy, StrategyFuture};

fn default_email_claim() -> String {
    "email".to_string()
}

/// Locally verified ID tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HMAC secret, or a PEM public key for asymmetric algorithms.
    pub secret_or_key: String,
    /// Pinned algorithm, e.g. `HS256` or `RS256`. The token header never decides.
    pub algorithm: String,
    #[serde(default = "default_email_claim")]
    pub email_claim: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub leeway_seconds: Option<u64>,
}

impl JwtConfig {
    pub fn new(secret_or_key: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            secret_or_key: secret_or_key.into(),
            algorithm: algorithm.into(),
            email_claim: default_email_claim(),
            issuer: None,
            audience: None,
            leeway_seconds: None,
        }
    }
}

/// Parse an algorithm name from configuration.
pub(crate) fn parse_algorithm(name: &str) -> Result<Algorithm, AuthError> {
    name.parse::<Algorithm>()
        .map_err(|_| AuthError::misconfigured(format!("unsupported JWT algorithm '{}'", name)))
}

fn decoding_key(algorithm: Algorithm, material: &str) -> Result<DecodingKey, AuthError> {
    let pem_error = |e: jsonwebtoken::errors::Error| {
        AuthError::misconfigured(format!("invalid {:?} key: {}", algorithm, e))
    };
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            if material.is_empty() {
                return Err(AuthError::misconfigured("jwt provider needs a non-empty secret"));
            }
            Ok(DecodingKey::from_secret(material.as_bytes()))
        }
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(material.as_bytes()).map_err(pem_error),
        Algorithm::ES256 | Algorithm::ES384 => {
            DecodingKey::from_ec_pem(material.as_bytes()).map_err(pem_error)
        }
        Algorithm::EdDSA => DecodingKey::from_ed_pem(material.as_bytes()).map_err(pem_error),
        #[allow(unreachable_patterns)]
        _ => Err(AuthError::misconfigured(format!(
            "unsupported JWT algorithm {:?}",
            algorithm
        ))),
    }
}

/// Map a verification failure onto the request-local error taxonomy.
pub(crate) fn verification_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature => AuthError::SignatureInvalid(err.to_string()),
        ErrorKind::InvalidAlgorithm => {
            AuthError::SignatureInvalid("token algorithm does not match the pinned one".to_string())
        }
        ErrorKind::MissingRequiredClaim(claim) => AuthError::ClaimMissing(claim.clone()),
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::malformed(err.to_string()),
        _ => AuthError::rejected(err.to_string()),
    }
}

pub struct JwtStrategy {
    key: DecodingKey,
    validation: Validation,
    email_claim: String,
}

impl JwtStrategy {
    pub fn new(config: JwtConfig) -> Result<Self, AuthError> {
        let algorithm = parse_algorithm(&config.algorithm)?;
        let key = decoding_key(algorithm, &config.secret_or_key)?;
        if config.email_claim.is_empty() {
            return Err(AuthError::misconfigured("jwt provider needs an email_claim"));
        }

        let mut validation = Validation::new(algorithm);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(leeway) = config.leeway_seconds {
            validation.leeway = leeway;
        }

        Ok(Self {
            key,
            validation,
            email_claim: config.email_claim,
        })
    }

    fn verify(&self, payload: &ParsedAuthPayload) -> AuthOutcome {
        let jwt = match payload.id_token() {
            Ok(Some(jwt)) => jwt,
            Ok(None) => return AuthOutcome::Unauthenticated,
            Err(err) => return AuthOutcome::Invalid(err),
        };

        let claims = match decode::<Claims>(jwt.as_str(), &self.key, &self.validation) {
            Ok(data) => data.claims,
            Err(err) => return AuthOutcome::Invalid(verification_error(err)),
        };

        UserIdentity::from_claims(claims, &self.email_claim)
            .map(|identity| AuthenticatedUser::new(identity, payload.connector_tokens()))
            .into()
    }
}

impl AuthStrategy for JwtStrategy {
    fn name(&self) -> &'static str {
        "jwt"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::IdToken
    }

    fn validate<'a>(&'a self, payload: &'a ParsedAuthPayload) -> StrategyFuture<'a> {
        Box::pin(async move { self.verify(payload) })
    }
}
