//! Verified caller identity and the per-connector tokens that travel with it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::error::AuthError;

/// Raw JWT / introspection claims.
pub type Claims = serde_json::Map<String, Value>;

/// Identity extracted from a validated token or a custom validator.
///
/// It is immutable once created. Secret-only and API-key authentication
/// produce an identity with no email.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserIdentity {
    email: Option<String>,
    claims: Claims,
}

impl UserIdentity {
    /// Create an identity with an email and the claims it came from.
    pub fn new(email: impl Into<String>, claims: Claims) -> Self {
        Self {
            email: Some(email.into()),
            claims,
        }
    }

    /// Identity-less user (shared secret or API key).
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build an identity from verified claims, reading the email from `email_claim`.
    ///
    /// A missing or non-string claim is an error: no partial identities.
    pub fn from_claims(claims: Claims, email_claim: &str) -> Result<Self, AuthError> {
        let email = claims
            .get(email_claim)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AuthError::ClaimMissing(email_claim.to_string()))?;

        Ok(Self {
            email: Some(email),
            claims,
        })
    }

    /// Get the email if available.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Get all claims.
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Get a single claim.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn is_anonymous(&self) -> bool {
        self.email.is_none()
    }
}

/// Connector name to opaque access token.
///
/// Values are secrets: `Debug` only prints connector names.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorTokenSet(BTreeMap<String, String>);

impl ConnectorTokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connector: impl Into<String>, token: impl Into<String>) {
        self.0.insert(connector.into(), token.into());
    }

    /// Get the access token for a connector.
    pub fn get(&self, connector: &str) -> Option<&str> {
        self.0.get(connector).map(String::as_str)
    }

    /// Connector names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for ConnectorTokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

impl From<BTreeMap<String, String>> for ConnectorTokenSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnectorTokenSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// What the gate stores for a request once a strategy succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    identity: UserIdentity,
    connector_tokens: ConnectorTokenSet,
    strategy: Option<&'static str>,
}

impl AuthenticatedUser {
    pub fn new(identity: UserIdentity, connector_tokens: ConnectorTokenSet) -> Self {
        Self {
            identity,
            connector_tokens,
            strategy: None,
        }
    }

    /// Identity-less user with no connector tokens.
    pub fn anonymous() -> Self {
        Self::new(UserIdentity::anonymous(), ConnectorTokenSet::new())
    }

    /// Record which strategy produced this user.
    pub(crate) fn authenticated_by(mut self, strategy: &'static str) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn email(&self) -> Option<&str> {
        self.identity.email()
    }

    pub fn connector_tokens(&self) -> &ConnectorTokenSet {
        &self.connector_tokens
    }

    /// Name of the strategy that authenticated this user, if recorded.
    pub fn strategy(&self) -> Option<&'static str> {
        self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_identity_from_claims() {
        let identity = UserIdentity::from_claims(
            claims(json!({"email": "user@example.com", "sub": "u1"})),
            "email",
        )
        .unwrap();

        assert_eq!(identity.email(), Some("user@example.com"));
        assert_eq!(identity.claim("sub"), Some(&json!("u1")));
        assert!(!identity.is_anonymous());
    }

    #[test]
    fn test_identity_custom_claim_name() {
        let identity =
            UserIdentity::from_claims(claims(json!({"sub": "svc@example.com"})), "sub").unwrap();
        assert_eq!(identity.email(), Some("svc@example.com"));
    }

    #[test]
    fn test_identity_missing_claim_is_error() {
        let err = UserIdentity::from_claims(claims(json!({"sub": "u1"})), "email").unwrap_err();
        assert_eq!(err, AuthError::ClaimMissing("email".to_string()));

        let err =
            UserIdentity::from_claims(claims(json!({"email": 42})), "email").unwrap_err();
        assert_eq!(err, AuthError::ClaimMissing("email".to_string()));
    }

    #[test]
    fn test_connector_tokens_debug_hides_values() {
        let tokens: ConnectorTokenSet =
            [("google", "ya29.secret"), ("slack", "xoxb-secret")].into_iter().collect();

        let debug = format!("{:?}", tokens);
        assert!(debug.contains("google"));
        assert!(debug.contains("slack"));
        assert!(!debug.contains("secret"));
        assert_eq!(tokens.names(), vec!["google".to_string(), "slack".to_string()]);
        assert_eq!(tokens.get("google"), Some("ya29.secret"));
    }

    #[test]
    fn test_anonymous_user() {
        let user = AuthenticatedUser::anonymous();
        assert!(user.identity().is_anonymous());
        assert!(user.email().is_none());
        assert!(user.connector_tokens().is_empty());
        assert!(user.strategy().is_none());
        assert_eq!(user.authenticated_by("secret").strategy(), Some("secret"));
    }
}
