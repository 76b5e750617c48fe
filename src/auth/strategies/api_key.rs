use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::auth::credentials::{ParsedAuthPayload, PayloadKind};
use crate::auth::error::{AuthError, AuthOutcome};
use crate::auth::identity::{AuthenticatedUser, UserIdentity};
use crate::auth::strategies::{AuthStrategy, StrategyFuture, digests_match};

/// Static API keys. Only SHA-256 digests of the keys are held in memory.
pub struct ApiKeyStrategy {
    digests: Vec<[u8; 32]>,
}

impl ApiKeyStrategy {
    pub fn new<I, S>(keys: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let digests: BTreeSet<[u8; 32]> = keys
            .into_iter()
            .filter(|k| !k.as_ref().is_empty())
            .map(|k| Sha256::digest(k.as_ref().as_bytes()).into())
            .collect();
        if digests.is_empty() {
            return Err(AuthError::misconfigured("api_key provider needs at least one key"));
        }
        Ok(Self {
            digests: digests.into_iter().collect(),
        })
    }

    pub fn key_count(&self) -> usize {
        self.digests.len()
    }

    fn accepts(&self, key: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(key.as_bytes()).into();
        // Visit every key so timing does not depend on which one matched.
        self.digests
            .iter()
            .fold(false, |found, digest| digests_match(&presented, digest) | found)
    }
}

impl AuthStrategy for ApiKeyStrategy {
    fn name(&self) -> &'static str {
        "api_key"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::ApiKey
    }

    fn validate<'a>(&'a self, payload: &'a ParsedAuthPayload) -> StrategyFuture<'a> {
        Box::pin(async move {
            let key = match payload.opaque() {
                Ok(key) => key,
                Err(err) => return AuthOutcome::Invalid(err),
            };
            if self.accepts(key) {
                AuthOutcome::Authenticated(AuthenticatedUser::new(
                    UserIdentity::anonymous(),
                    payload.connector_tokens(),
                ))
            } else {
                AuthOutcome::Invalid(AuthError::rejected("unknown API key"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_api_key_membership() {
        let strategy = ApiKeyStrategy::new(["k1", "k2"]).unwrap();
        assert_eq!(strategy.key_count(), 2);

        let ok = strategy
            .validate(&ParsedAuthPayload::opaque_token("k2"))
            .await;
        let user = ok.into_user().unwrap();
        assert!(user.identity().is_anonymous());
        assert!(user.connector_tokens().is_empty());

        let bad = strategy
            .validate(&ParsedAuthPayload::opaque_token("k3"))
            .await;
        assert!(matches!(bad, AuthOutcome::Invalid(AuthError::TokenRejected(_))));
    }

    #[tokio::test]
    async fn test_api_key_keeps_connector_tokens() {
        let strategy = ApiKeyStrategy::new(["k1"]).unwrap();
        let payload = ParsedAuthPayload::Opaque {
            token: "k1".to_string(),
            connectors: [("google", "g-token")].into_iter().collect(),
        };

        let user = strategy.validate(&payload).await.into_user().unwrap();
        assert!(user.identity().is_anonymous());
        assert_eq!(user.connector_tokens().get("google"), Some("g-token"));
    }

    #[test]
    fn test_duplicate_and_empty_keys() {
        let strategy = ApiKeyStrategy::new(["k1", "k1", ""]).unwrap();
        assert_eq!(strategy.key_count(), 1);
        assert!(ApiKeyStrategy::new(Vec::<String>::new()).is_err());
        assert!(ApiKeyStrategy::new([""]).is_err());
    }
}
