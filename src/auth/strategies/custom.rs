use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::auth::credentials::{ParsedAuthPayload, PayloadKind};
use crate::auth::error::{AuthError, AuthOutcome};
use crate::auth::identity::{AuthenticatedUser, Claims, ConnectorTokenSet, UserIdentity};
use crate::auth::strategies::{AuthStrategy, StrategyFuture};

/// What a custom validator returns for a token it accepts.
#[derive(Debug, Clone, Default)]
pub struct ValidatedToken {
    pub email: String,
    pub claims: Claims,
    pub connector_access_tokens: ConnectorTokenSet,
}

impl ValidatedToken {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn with_claims(mut self, claims: Claims) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_connector_tokens(mut self, tokens: ConnectorTokenSet) -> Self {
        self.connector_access_tokens = tokens;
        self
    }
}

pub type ValidatorFuture<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<Option<ValidatedToken>>> + Send + 'a>>;

/// Externally supplied token check.
///
/// `Ok(None)` is the explicit "no identity" answer.
pub trait TokenValidator: Send + Sync + 'static {
    fn validate<'a>(&'a self, token: &'a str) -> ValidatorFuture<'a>;
}

/// Adapts an async closure into a [`TokenValidator`].
pub struct FnValidator<F> {
    f: F,
}

impl<F, Fut> TokenValidator for FnValidator<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<ValidatedToken>>> + Send + 'static,
{
    fn validate<'a>(&'a self, token: &'a str) -> ValidatorFuture<'a> {
        Box::pin((self.f)(token.to_string()))
    }
}

/// Wrap a closure as a validator.
///
/// ```ignore
/// let validator = validator_fn(|token| async move {
///     Ok((token == "letmein").then(|| ValidatedToken::new("user@example.com")))
/// });
/// ```
pub fn validator_fn<F, Fut>(f: F) -> FnValidator<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<ValidatedToken>>> + Send + 'static,
{
    FnValidator { f }
}

/// Delegates the bearer token to a user supplied validator.
///
/// The validator is untrusted: it runs on its own task, so an error or a panic
/// inside it becomes `Invalid` for this request only.
pub struct CustomStrategy {
    validator: Arc<dyn TokenValidator>,
}

impl CustomStrategy {
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self { validator }
    }

    async fn run(&self, payload: &ParsedAuthPayload) -> AuthOutcome {
        let token = match payload.opaque() {
            Ok(token) => token.to_string(),
            Err(err) => return AuthOutcome::Invalid(err),
        };

        let validator = Arc::clone(&self.validator);
        let joined = tokio::spawn(async move { validator.validate(&token).await }).await;

        let validated = match joined {
            Ok(Ok(Some(validated))) => validated,
            Ok(Ok(None)) => {
                return AuthOutcome::Invalid(AuthError::rejected("validator returned no identity"));
            }
            Ok(Err(err)) => {
                return AuthOutcome::Invalid(AuthError::rejected(format!("validator failed: {:#}", err)));
            }
            Err(join_err) => {
                return AuthOutcome::Invalid(AuthError::rejected(format!(
                    "validator aborted: {}",
                    join_err
                )));
            }
        };

        if validated.email.is_empty() {
            return AuthOutcome::Invalid(AuthError::ClaimMissing("email".to_string()));
        }

        let connector_tokens = if validated.connector_access_tokens.is_empty() {
            payload.connector_tokens()
        } else {
            validated.connector_access_tokens
        };
        AuthOutcome::Authenticated(AuthenticatedUser::new(
            UserIdentity::new(validated.email, validated.claims),
            connector_tokens,
        ))
    }
}

impl AuthStrategy for CustomStrategy {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Bearer
    }

    fn validate<'a>(&'a self, payload: &'a ParsedAuthPayload) -> StrategyFuture<'a> {
        Box::pin(self.run(payload))
    }
}
