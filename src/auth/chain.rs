//! Ordered strategy evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::credentials::{ParsedAuthPayload, PayloadKind, RawCredential};
use crate::auth::error::{AuthError, AuthOutcome};
use crate::auth::observer::{AuthObserver, NoopObserver};
use crate::auth::strategies::AuthStrategy;
use crate::config::{AuthProvider, GateSettings};

/// Configured strategies, tried in order until one authenticates.
///
/// Immutable after construction and shared across requests without locking.
#[derive(Clone)]
pub struct AuthChain {
    strategies: Vec<Arc<dyn AuthStrategy>>,
    observer: Arc<dyn AuthObserver>,
}

impl std::fmt::Debug for AuthChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthChain")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl AuthChain {
    pub fn new(
        strategies: Vec<Arc<dyn AuthStrategy>>,
        observer: Arc<dyn AuthObserver>,
    ) -> Result<Self, AuthError> {
        if strategies.is_empty() {
            return Err(AuthError::misconfigured("at least one auth provider is required"));
        }
        Ok(Self {
            strategies,
            observer,
        })
    }

    /// Build every provider eagerly; the first misconfiguration aborts.
    pub fn from_providers(
        providers: Vec<AuthProvider>,
        observer: Arc<dyn AuthObserver>,
    ) -> Result<Self, AuthError> {
        let strategies = providers
            .into_iter()
            .map(AuthProvider::build)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(strategies, observer)
    }

    pub fn from_settings(settings: &GateSettings) -> Result<Self, AuthError> {
        Self::from_providers(settings.auth_providers(), settings.observer())
    }

    /// Chain with the no-op observer.
    pub fn quiet(strategies: Vec<Arc<dyn AuthStrategy>>) -> Result<Self, AuthError> {
        Self::new(strategies, Arc::new(NoopObserver))
    }

    pub fn observer(&self) -> &Arc<dyn AuthObserver> {
        &self.observer
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the chain against one request's credentials.
    ///
    /// The first `Authenticated` result wins. Anything else collapses to
    /// `Unauthenticated`; individual reasons only reach the observer.
    pub async fn authenticate(&self, raw: &RawCredential) -> AuthOutcome {
        self.observer.credentials_received(&raw.summary());

        let mut parsed: HashMap<PayloadKind, Option<Result<ParsedAuthPayload, AuthError>>> =
            HashMap::new();

        for strategy in &self.strategies {
            let kind = strategy.payload_kind();
            let interpretation = parsed.entry(kind).or_insert_with(|| raw.interpret(kind));

            let outcome = match interpretation {
                None => AuthOutcome::Unauthenticated,
                Some(Err(err)) => AuthOutcome::Invalid(err.clone()),
                Some(Ok(payload)) => strategy.validate(payload).await,
            };
            self.observer.strategy_finished(strategy.name(), &outcome);

            if let AuthOutcome::Authenticated(user) = outcome {
                let outcome = AuthOutcome::Authenticated(user.authenticated_by(strategy.name()));
                self.observer.chain_finished(&outcome);
                return outcome;
            }
        }

        let outcome = AuthOutcome::Unauthenticated;
        self.observer.chain_finished(&outcome);
        outcome
    }
}
