//! Credential parsing, validation and request-scoped identity.
//!
//! The pieces, in request order:
//!
//! - [`credentials`]: structural decoding of the presented headers
//! - [`strategies`]: validation mechanisms behind one [`AuthStrategy`] seam
//! - [`chain`]: ordered evaluation of the configured strategies
//! - [`context`]: per-request identity storage with guaranteed cleanup
//!
//! Diagnostics go through an [`AuthObserver`] rather than being logged from
//! validation code.

pub mod chain;
pub mod context;
pub mod credentials;
mod error;
mod identity;
pub mod jwks;
pub mod observer;
pub mod strategies;

pub use chain::AuthChain;
pub use context::{ContextError, IdentityContexts, IdentityScope, RequestHandle, RequestId};
pub use credentials::{CompositeToken, HeaderNames, ParsedAuthPayload, PayloadKind, RawCredential};
pub use error::{AuthError, AuthOutcome};
pub use identity::{AuthenticatedUser, Claims, ConnectorTokenSet, UserIdentity};
pub use jwks::{DEFAULT_CACHE_TTL_SECONDS, JwksCache, JwksError};
pub use observer::{AuthObserver, CredentialSummary, NoopObserver, TracingObserver};
pub use strategies::{AuthStrategy, TokenValidator, ValidatedToken, validator_fn};
