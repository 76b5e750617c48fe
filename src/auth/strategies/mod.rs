//! Credential validation strategies.
//!
//! Each strategy turns one interpretation of the presented headers into an
//! [`AuthOutcome`]. Strategies never reject a request themselves; the gate
//! decides what an outcome means for a route.

mod api_key;
mod custom;
mod introspection;
mod jwt;
mod secret;
mod trusted_issuers;

use std::future::Future;
use std::pin::Pin;

use sha2::{Digest, Sha256};

use crate::auth::credentials::{ParsedAuthPayload, PayloadKind};
use crate::auth::error::AuthOutcome;

pub use api_key::ApiKeyStrategy;
pub use custom::{CustomStrategy, FnValidator, TokenValidator, ValidatedToken, ValidatorFuture, validator_fn};
pub use introspection::{IntrospectionConfig, IntrospectionStrategy};
pub use jwt::{JwtConfig, JwtStrategy};
pub use secret::SecretStrategy;
pub use trusted_issuers::{TrustedIssuersConfig, TrustedIssuersStrategy};

#[cfg(test)]
pub(crate) use jwt::test_tokens;

/// Boxed future returned by [`AuthStrategy::validate`].
pub type StrategyFuture<'a> = Pin<Box<dyn Future<Output = AuthOutcome> + Send + 'a>>;

/// One validation mechanism.
pub trait AuthStrategy: Send + Sync {
    /// Stable name used in diagnostics and recorded on the authenticated user.
    fn name(&self) -> &'static str;

    /// Which interpretation of the headers this strategy consumes.
    fn payload_kind(&self) -> PayloadKind;

    /// Validate a parsed payload.
    fn validate<'a>(&'a self, payload: &'a ParsedAuthPayload) -> StrategyFuture<'a>;
}

/// Compare two secrets without leaking their length or common prefix.
///
/// Both sides are hashed first, so the comparison always runs over 32 bytes.
pub(crate) fn secrets_match(presented: &[u8], expected: &[u8]) -> bool {
    let presented: [u8; 32] = Sha256::digest(presented).into();
    let expected: [u8; 32] = Sha256::digest(expected).into();
    digests_match(&presented, &expected)
}

pub(crate) fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
