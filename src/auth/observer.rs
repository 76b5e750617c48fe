//! Diagnostics collaborator for the auth pipeline.
//!
//! Validation code never logs on its own; the chain and the gate notify an
//! [`AuthObserver`] instead. Observers only ever see presence flags, lengths,
//! strategy names and error reasons. Secret and token values are not passed in.

use std::sync::Arc;

use tracing::debug;

use crate::auth::error::AuthOutcome;
use crate::gate::RouteAuthPolicy;

/// Which credential headers were presented (values are never included).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialSummary {
    pub bearer: bool,
    pub bearer_len: usize,
    pub api_key: bool,
    pub id_token: bool,
    pub connector_tokens: bool,
    pub server_secret: bool,
}

/// Receives auth pipeline events. Every method defaults to doing nothing.
pub trait AuthObserver: Send + Sync {
    fn credentials_received(&self, _summary: &CredentialSummary) {}

    fn strategy_finished(&self, _strategy: &'static str, _outcome: &AuthOutcome) {}

    fn chain_finished(&self, _outcome: &AuthOutcome) {}

    fn request_gated(&self, _path: &str, _policy: RouteAuthPolicy, _authenticated: bool) {}
}

/// Observer used when the debug flag is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AuthObserver for NoopObserver {}

/// Emits `tracing` debug events for every pipeline step.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AuthObserver for TracingObserver {
    fn credentials_received(&self, summary: &CredentialSummary) {
        debug!(
            bearer = summary.bearer,
            bearer_len = summary.bearer_len,
            api_key = summary.api_key,
            id_token = summary.id_token,
            connector_tokens = summary.connector_tokens,
            server_secret = summary.server_secret,
            "Credentials received"
        );
    }

    fn strategy_finished(&self, strategy: &'static str, outcome: &AuthOutcome) {
        match outcome {
            AuthOutcome::Authenticated(user) => debug!(
                strategy,
                email = user.email().unwrap_or("<none>"),
                connectors = ?user.connector_tokens().names(),
                "Strategy authenticated request"
            ),
            AuthOutcome::Unauthenticated => {
                debug!(strategy, "Strategy found no usable credential")
            }
            AuthOutcome::Invalid(err) => debug!(
                strategy,
                reason = err.kind(),
                "Strategy rejected credential: {}",
                err
            ),
        }
    }

    fn chain_finished(&self, outcome: &AuthOutcome) {
        debug!(outcome = outcome.kind(), "Auth chain finished");
    }

    fn request_gated(&self, path: &str, policy: RouteAuthPolicy, authenticated: bool) {
        debug!(path, ?policy, authenticated, "Request gated");
    }
}

/// Pick the observer for a debug flag.
pub fn observer_for(debug: bool) -> Arc<dyn AuthObserver> {
    if debug {
        Arc::new(TracingObserver)
    } else {
        Arc::new(NoopObserver)
    }
}
