//! Authentication errors and the typed outcome every strategy produces.

use std::fmt;

use crate::auth::identity::AuthenticatedUser;

/// Reasons a credential failed to authenticate.
///
/// Only `ProviderMisconfigured` is raised outside a request (at startup);
/// every other variant is request-local and ends up as `AuthOutcome::Invalid`.
/// The messages are internal diagnostics and are never sent to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Bad base64, bad JSON or a token that is not a compact JWS.
    MalformedCredential(String),
    /// Signature (or pinned algorithm) check failed.
    SignatureInvalid(String),
    /// The token's `exp` is in the past.
    TokenExpired,
    /// Shared server secret missing or different from the configured one.
    SecretMismatch,
    /// Introspection or key discovery endpoint failed, timed out or answered non-2xx.
    IntrospectionUnreachable(String),
    /// A required claim (e.g. the configured email claim) is absent.
    ClaimMissing(String),
    /// The credential was well formed but refused (inactive token, unknown key, ...).
    TokenRejected(String),
    /// Startup configuration is invalid. Fatal.
    ProviderMisconfigured(String),
}

impl AuthError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedCredential(msg.into())
    }

    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Self::ProviderMisconfigured(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::TokenRejected(msg.into())
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::IntrospectionUnreachable(msg.into())
    }

    /// Short stable label, suitable as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedCredential(_) => "malformed_credential",
            Self::SignatureInvalid(_) => "signature_invalid",
            Self::TokenExpired => "token_expired",
            Self::SecretMismatch => "secret_mismatch",
            Self::IntrospectionUnreachable(_) => "introspection_unreachable",
            Self::ClaimMissing(_) => "claim_missing",
            Self::TokenRejected(_) => "token_rejected",
            Self::ProviderMisconfigured(_) => "provider_misconfigured",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedCredential(msg) => write!(f, "Malformed credential: {}", msg),
            Self::SignatureInvalid(msg) => write!(f, "Invalid signature: {}", msg),
            Self::TokenExpired => write!(f, "Token has expired"),
            Self::SecretMismatch => write!(f, "Server secret mismatch"),
            Self::IntrospectionUnreachable(msg) => {
                write!(f, "Introspection unavailable: {}", msg)
            }
            Self::ClaimMissing(claim) => write!(f, "Missing claim: {}", claim),
            Self::TokenRejected(msg) => write!(f, "Token rejected: {}", msg),
            Self::ProviderMisconfigured(msg) => write!(f, "Provider misconfigured: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Result of running one strategy (or the whole chain) against a request.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Authenticated(AuthenticatedUser),
    /// Nothing this strategy understands was presented.
    Unauthenticated,
    /// Something was presented and it failed; the reason is internal only.
    Invalid(AuthError),
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::Unauthenticated => "unauthenticated",
            Self::Invalid(_) => "invalid",
        }
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn into_user(self) -> Option<AuthenticatedUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

impl From<Result<AuthenticatedUser, AuthError>> for AuthOutcome {
    fn from(result: Result<AuthenticatedUser, AuthError>) -> Self {
        match result {
            Ok(user) => Self::Authenticated(user),
            Err(err) => Self::Invalid(err),
        }
    }
}
