use crate::auth::credentials::{ParsedAuthPayload, PayloadKind};
use crate::auth::error::{AuthError, AuthOutcome};
use crate::auth::identity::{AuthenticatedUser, UserIdentity};
use crate::auth::strategies::{AuthStrategy, StrategyFuture, secrets_match};

/// Shared server secret carried in the composite envelope.
///
/// Produces an identity-less user; any ID token in the payload is ignored.
pub struct SecretStrategy {
    secret: String,
}

impl SecretStrategy {
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AuthError::misconfigured("secret provider needs a non-empty secret"));
        }
        Ok(Self { secret })
    }

    fn check(&self, payload: &ParsedAuthPayload) -> AuthOutcome {
        let ParsedAuthPayload::Composite(token) = payload else {
            return AuthOutcome::Invalid(AuthError::malformed("expected a composite token"));
        };
        match token.server_secret.as_deref() {
            Some(presented) if secrets_match(presented.as_bytes(), self.secret.as_bytes()) => {
                AuthOutcome::Authenticated(AuthenticatedUser::new(
                    UserIdentity::anonymous(),
                    token.connector_access_tokens.clone(),
                ))
            }
            _ => AuthOutcome::Invalid(AuthError::SecretMismatch),
        }
    }
}

impl AuthStrategy for SecretStrategy {
    fn name(&self) -> &'static str {
        "secret"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Composite
    }

    fn validate<'a>(&'a self, payload: &'a ParsedAuthPayload) -> StrategyFuture<'a> {
        Box::pin(async move { self.check(payload) })
    }
}
