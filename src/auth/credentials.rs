//! Structural decoding of presented credentials.
//!
//! Nothing here establishes trust. A header is either absent, decodes into a
//! [`ParsedAuthPayload`], or fails with [`AuthError::MalformedCredential`];
//! the strategies decide what a decoded payload is worth.
//!
//! Recognized encodings:
//!
//! - **Composite**: `Authorization: Bearer <base64(JSON)>` carrying
//!   `server_secret`, `user_id_token` and `connector_access_tokens`.
//! - **Split headers**: an ID-token header, a base64-JSON connector-tokens
//!   header and an optional server-secret header (same content as composite).
//! - **Bare JWT**: `Authorization: Bearer <header.payload.signature>`.
//! - **API key**: `X-API-Key: <opaque>` (or the raw bearer value).

use std::fmt;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::error::AuthError;
use crate::auth::identity::{Claims, ConnectorTokenSet};
use crate::auth::observer::CredentialSummary;

/// Envelope schema version written by [`CompositeToken::encode`].
pub const COMPOSITE_TOKEN_VERSION: u32 = 1;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

fn decode_base64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD_LENIENT
        .decode(value)
        .or_else(|_| URL_SAFE_LENIENT.decode(value))
}

/// Header names the parser reads. Defaults are used unless configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderNames {
    pub id_token: String,
    pub connector_tokens: String,
    pub server_secret: String,
    pub api_key: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            id_token: "X-Id-Token".to_string(),
            connector_tokens: "X-Connector-Tokens".to_string(),
            server_secret: "X-Server-Secret".to_string(),
            api_key: "X-API-Key".to_string(),
        }
    }
}

/// Which interpretation of the presented headers a strategy consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// Composite envelope or split headers.
    Composite,
    /// A user ID token: from the composite/split form or a bare JWT bearer.
    IdToken,
    /// The raw bearer token, for introspection and custom validators.
    Bearer,
    /// An opaque API key, from the API-key header or the bearer value.
    ApiKey,
}

/// A compact JWS string whose structure (three non-empty segments) was checked.
#[derive(Clone, PartialEq, Eq)]
pub struct CompactJwt(String);

impl CompactJwt {
    pub fn parse(token: &str) -> Result<Self, AuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(AuthError::malformed(format!(
                "JWT must have 3 segments, found {}",
                segments.len()
            )));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(AuthError::malformed("JWT has an empty segment"));
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CompactJwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompactJwt(<{} bytes>)", self.0.len())
    }
}

/// Read a JWT's payload without verifying anything.
///
/// Only used to route a token (e.g. pick its issuer) before verification.
pub fn decode_claims_unverified(jwt: &CompactJwt) -> Result<Claims, AuthError> {
    let payload = jwt
        .0
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::malformed("JWT payload missing"))?;
    let bytes = URL_SAFE_LENIENT
        .decode(payload)
        .map_err(|e| AuthError::malformed(format!("JWT payload is not base64url: {}", e)))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(_) => Err(AuthError::malformed("JWT payload is not a JSON object")),
        Err(e) => Err(AuthError::malformed(format!("JWT payload is not JSON: {}", e))),
    }
}

#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct CompositeWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    server_secret: Option<String>,
    user_id_token: Option<String>,
    connector_access_tokens: Option<ConnectorTokenSet>,
}

/// Decoded composite envelope. Every field is optional on the wire.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CompositeToken {
    pub server_secret: Option<String>,
    pub user_id_token: Option<String>,
    pub connector_access_tokens: ConnectorTokenSet,
}

impl CompositeToken {
    /// Decode a bearer value (base64 of a JSON object).
    pub fn decode(bearer: &str) -> Result<Self, AuthError> {
        let bytes = decode_base64(bearer)
            .map_err(|e| AuthError::malformed(format!("bearer is not base64: {}", e)))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::malformed(format!("bearer is not JSON: {}", e)))?;
        if !value.is_object() {
            return Err(AuthError::malformed("bearer JSON is not an object"));
        }
        let wire: CompositeWire = serde_json::from_value(value)
            .map_err(|e| AuthError::malformed(format!("unexpected bearer fields: {}", e)))?;

        match wire.version {
            None | Some(COMPOSITE_TOKEN_VERSION) => {}
            Some(v) => {
                return Err(AuthError::malformed(format!(
                    "unsupported composite token version {}",
                    v
                )));
            }
        }

        Ok(Self {
            server_secret: wire.server_secret,
            user_id_token: wire.user_id_token,
            connector_access_tokens: wire.connector_access_tokens.unwrap_or_default(),
        })
    }

    /// Encode as a bearer value (standard base64, padded).
    pub fn encode(&self) -> String {
        let wire = CompositeWire {
            version: Some(COMPOSITE_TOKEN_VERSION),
            server_secret: self.server_secret.clone(),
            user_id_token: self.user_id_token.clone(),
            connector_access_tokens: Some(self.connector_access_tokens.clone()),
        };
        // Serializing plain strings and string maps cannot fail.
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        base64::engine::general_purpose::STANDARD.encode(json)
    }
}

impl fmt::Debug for CompositeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeToken")
            .field("server_secret", &self.server_secret.as_ref().map(|_| "<redacted>"))
            .field("user_id_token", &self.user_id_token.as_ref().map(|_| "<redacted>"))
            .field("connector_access_tokens", &self.connector_access_tokens)
            .finish()
    }
}

/// Decode a connector-tokens header: base64 (URL-safe or standard) JSON object
/// of string to string.
pub fn decode_connector_tokens(raw: &str) -> Result<ConnectorTokenSet, AuthError> {
    if raw.is_empty() {
        return Ok(ConnectorTokenSet::new());
    }
    let bytes = URL_SAFE_LENIENT
        .decode(raw)
        .or_else(|_| STANDARD_LENIENT.decode(raw))
        .map_err(|e| AuthError::malformed(format!("connector tokens are not base64: {}", e)))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::malformed(format!("connector tokens are not JSON: {}", e)))?;
    let Value::Object(map) = value else {
        return Err(AuthError::malformed("connector tokens must be a JSON object"));
    };

    let mut tokens = ConnectorTokenSet::new();
    for (connector, token) in map {
        match token {
            Value::String(token) => tokens.insert(connector, token),
            _ => {
                return Err(AuthError::malformed(
                    "connector tokens must have string values",
                ));
            }
        }
    }
    Ok(tokens)
}

/// One structural reading of the presented credential.
#[derive(Clone, PartialEq, Eq)]
pub enum ParsedAuthPayload {
    Composite(CompositeToken),
    BareJwt(CompactJwt),
    /// An API key or a token for an external validator, plus whatever
    /// connector tokens travelled next to it.
    Opaque {
        token: String,
        connectors: ConnectorTokenSet,
    },
}

impl ParsedAuthPayload {
    /// Opaque token with no connector tokens.
    pub fn opaque_token(token: impl Into<String>) -> Self {
        Self::Opaque {
            token: token.into(),
            connectors: ConnectorTokenSet::new(),
        }
    }

    /// Connector tokens carried by the payload.
    pub fn connector_tokens(&self) -> ConnectorTokenSet {
        match self {
            Self::Composite(token) => token.connector_access_tokens.clone(),
            Self::Opaque { connectors, .. } => connectors.clone(),
            Self::BareJwt(_) => ConnectorTokenSet::new(),
        }
    }

    /// The user ID token to verify, checked for JWT structure.
    ///
    /// `Ok(None)` means the payload simply carries no ID token.
    pub fn id_token(&self) -> Result<Option<CompactJwt>, AuthError> {
        match self {
            Self::Composite(token) => token.user_id_token.as_deref().map(CompactJwt::parse).transpose(),
            Self::BareJwt(jwt) => Ok(Some(jwt.clone())),
            Self::Opaque { .. } => Err(AuthError::malformed("expected a JWT")),
        }
    }

    /// The opaque token string for bearer / API-key strategies.
    pub fn opaque(&self) -> Result<&str, AuthError> {
        match self {
            Self::Opaque { token, .. } => Ok(token),
            Self::BareJwt(jwt) => Ok(jwt.as_str()),
            Self::Composite(_) => Err(AuthError::malformed("expected an opaque token")),
        }
    }
}

impl fmt::Debug for ParsedAuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Composite(token) => f.debug_tuple("Composite").field(token).finish(),
            Self::BareJwt(jwt) => f.debug_tuple("BareJwt").field(jwt).finish(),
            Self::Opaque { token, connectors } => f
                .debug_struct("Opaque")
                .field("token", &format_args!("<{} bytes>", token.len()))
                .field("connectors", connectors)
                .finish(),
        }
    }
}

/// Untouched header values for one request.
#[derive(Clone, Default)]
pub struct RawCredential {
    bearer: Option<String>,
    api_key: Option<String>,
    id_token: Option<String>,
    connector_tokens: Option<String>,
    server_secret: Option<String>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extract the token from an `Authorization: Bearer <token>` value.
fn bearer_token(authorization: &str) -> Option<String> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

impl RawCredential {
    pub fn from_headers(headers: &HeaderMap, names: &HeaderNames) -> Self {
        Self {
            bearer: header_value(headers, http::header::AUTHORIZATION.as_str())
                .and_then(|v| bearer_token(&v)),
            api_key: header_value(headers, &names.api_key),
            id_token: header_value(headers, &names.id_token),
            connector_tokens: header_value(headers, &names.connector_tokens),
            server_secret: header_value(headers, &names.server_secret),
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    pub fn with_connector_tokens(mut self, encoded: impl Into<String>) -> Self {
        self.connector_tokens = Some(encoded.into());
        self
    }

    pub fn with_server_secret(mut self, secret: impl Into<String>) -> Self {
        self.server_secret = Some(secret.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bearer.is_none()
            && self.api_key.is_none()
            && !self.has_split_headers()
    }

    fn has_split_headers(&self) -> bool {
        self.id_token.is_some() || self.connector_tokens.is_some() || self.server_secret.is_some()
    }

    /// Presence-only view for diagnostics.
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            bearer: self.bearer.is_some(),
            bearer_len: self.bearer.as_ref().map_or(0, String::len),
            api_key: self.api_key.is_some(),
            id_token: self.id_token.is_some(),
            connector_tokens: self.connector_tokens.is_some(),
            server_secret: self.server_secret.is_some(),
        }
    }

    /// The connector-tokens header, decoded. Absent means empty.
    fn split_connectors(&self) -> Result<ConnectorTokenSet, AuthError> {
        Ok(self
            .connector_tokens
            .as_deref()
            .map(decode_connector_tokens)
            .transpose()?
            .unwrap_or_default())
    }

    fn opaque_with_split_connectors(
        &self,
        token: String,
    ) -> Result<ParsedAuthPayload, AuthError> {
        let connectors = self.split_connectors()?;
        Ok(ParsedAuthPayload::Opaque { token, connectors })
    }

    fn split_composite(&self) -> Result<CompositeToken, AuthError> {
        let user_id_token = self
            .id_token
            .as_deref()
            .map(CompactJwt::parse)
            .transpose()?
            .map(|jwt| jwt.0);
        let connector_access_tokens = self.split_connectors()?;

        Ok(CompositeToken {
            server_secret: self.server_secret.clone(),
            user_id_token,
            connector_access_tokens,
        })
    }

    /// The bearer decoded as a composite envelope, if it is one.
    ///
    /// JWTs always contain dots and base64 never does, so a dotted bearer is
    /// never treated as an envelope.
    fn bearer_envelope(&self) -> Option<Result<CompositeToken, AuthError>> {
        let bearer = self.bearer.as_deref()?;
        if bearer.contains('.') {
            return None;
        }
        Some(CompositeToken::decode(bearer))
    }

    /// Interpret the headers the way a `kind` strategy needs them.
    ///
    /// `None` means nothing relevant was presented. A decoding failure is
    /// returned as an error and is final for that strategy.
    pub fn interpret(&self, kind: PayloadKind) -> Option<Result<ParsedAuthPayload, AuthError>> {
        match kind {
            PayloadKind::Composite => {
                if self.has_split_headers() {
                    return Some(self.split_composite().map(ParsedAuthPayload::Composite));
                }
                let bearer = self.bearer.as_deref()?;
                Some(CompositeToken::decode(bearer).map(ParsedAuthPayload::Composite))
            }
            PayloadKind::IdToken => {
                if self.has_split_headers() {
                    return Some(self.split_composite().map(ParsedAuthPayload::Composite));
                }
                let bearer = self.bearer.as_deref()?;
                match self.bearer_envelope() {
                    Some(envelope) => Some(envelope.map(ParsedAuthPayload::Composite)),
                    None => Some(CompactJwt::parse(bearer).map(ParsedAuthPayload::BareJwt)),
                }
            }
            PayloadKind::Bearer => {
                if let Some(id_token) = &self.id_token {
                    return Some(self.opaque_with_split_connectors(id_token.clone()));
                }
                match self.bearer_envelope() {
                    // Never forward an envelope (it may hold the server secret);
                    // hand over the user token inside it instead.
                    Some(Ok(envelope)) => envelope.user_id_token.map(|token| {
                        Ok(ParsedAuthPayload::Opaque {
                            token,
                            connectors: envelope.connector_access_tokens,
                        })
                    }),
                    _ => {
                        let bearer = self.bearer.clone()?;
                        Some(self.opaque_with_split_connectors(bearer))
                    }
                }
            }
            PayloadKind::ApiKey => {
                let envelope = self.bearer_envelope();
                if let Some(key) = &self.api_key {
                    return Some(match envelope {
                        Some(Ok(envelope)) if self.connector_tokens.is_none() => {
                            Ok(ParsedAuthPayload::Opaque {
                                token: key.clone(),
                                connectors: envelope.connector_access_tokens,
                            })
                        }
                        _ => self.opaque_with_split_connectors(key.clone()),
                    });
                }
                match envelope {
                    Some(Ok(_)) => None,
                    _ => {
                        let bearer = self.bearer.clone()?;
                        Some(self.opaque_with_split_connectors(bearer))
                    }
                }
            }
        }
    }
}

impl fmt::Debug for RawCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawCredential").field(&self.summary()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    const JWT: &str = "eyJhbGciOiJIUzI1NiJ9.eyJlbWFpbCI6InVzZXJAZXhhbXBsZS5jb20ifQ.c2ln";

    fn composite(secret: Option<&str>, id_token: Option<&str>, connectors: &[(&str, &str)]) -> CompositeToken {
        CompositeToken {
            server_secret: secret.map(str::to_string),
            user_id_token: id_token.map(str::to_string),
            connector_access_tokens: connectors.iter().copied().collect(),
        }
    }

    #[test]
    fn test_composite_round_trip() {
        let token = composite(Some("s"), Some(JWT), &[("google", "g")]);
        let decoded = CompositeToken::decode(&token.encode()).unwrap();
        assert_eq!(decoded, token);

        let raw = RawCredential::default().with_bearer(token.encode());
        assert_eq!(
            raw.interpret(PayloadKind::Composite).unwrap().unwrap(),
            ParsedAuthPayload::Composite(token)
        );
    }

    #[test]
    fn test_composite_missing_keys_are_valid() {
        let bearer = base64::engine::general_purpose::STANDARD.encode(r#"{"server_secret":"s"}"#);
        let token = CompositeToken::decode(&bearer).unwrap();
        assert_eq!(token.server_secret.as_deref(), Some("s"));
        assert!(token.user_id_token.is_none());
        assert!(token.connector_access_tokens.is_empty());

        let bearer = base64::engine::general_purpose::STANDARD
            .encode(r#"{"server_secret":null,"user_id_token":null,"connector_access_tokens":null}"#);
        assert_eq!(CompositeToken::decode(&bearer).unwrap(), CompositeToken::default());
    }

    #[test]
    fn test_composite_accepts_url_safe_unpadded() {
        let json = r#"{"server_secret":"s??>","connector_access_tokens":{"a":"b"}}"#;
        let bearer = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json);
        let token = CompositeToken::decode(&bearer).unwrap();
        assert_eq!(token.server_secret.as_deref(), Some("s??>"));
    }

    #[test]
    fn test_composite_rejects_malformed() {
        assert!(matches!(
            CompositeToken::decode("not base64 at all!"),
            Err(AuthError::MalformedCredential(_))
        ));

        let not_json = base64::engine::general_purpose::STANDARD.encode("hello");
        assert!(matches!(
            CompositeToken::decode(&not_json),
            Err(AuthError::MalformedCredential(_))
        ));

        let array = base64::engine::general_purpose::STANDARD.encode(r#"["s", "t"]"#);
        assert!(matches!(
            CompositeToken::decode(&array),
            Err(AuthError::MalformedCredential(_))
        ));

        let bad_connectors =
            base64::engine::general_purpose::STANDARD.encode(r#"{"connector_access_tokens":{"a":1}}"#);
        assert!(matches!(
            CompositeToken::decode(&bad_connectors),
            Err(AuthError::MalformedCredential(_))
        ));
    }

    #[test]
    fn test_composite_version_tag() {
        let v1 = base64::engine::general_purpose::STANDARD.encode(r#"{"version":1,"server_secret":"s"}"#);
        assert!(CompositeToken::decode(&v1).is_ok());

        let v2 = base64::engine::general_purpose::STANDARD.encode(r#"{"version":2,"server_secret":"s"}"#);
        assert!(matches!(
            CompositeToken::decode(&v2),
            Err(AuthError::MalformedCredential(_))
        ));

        let encoded = composite(Some("s"), None, &[]).encode();
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["version"], 1);
    }

    #[test]
    fn test_compact_jwt_structure() {
        assert!(CompactJwt::parse(JWT).is_ok());
        assert!(CompactJwt::parse("a.b").is_err());
        assert!(CompactJwt::parse("a..c").is_err());
        assert!(CompactJwt::parse("a.b.c.d.e").is_err());
        assert!(CompactJwt::parse("invalid-jwt-token").is_err());
    }

    #[test]
    fn test_decode_claims_unverified() {
        let jwt = CompactJwt::parse(JWT).unwrap();
        let claims = decode_claims_unverified(&jwt).unwrap();
        assert_eq!(claims["email"], "user@example.com");

        let jwt = CompactJwt::parse("e30.bm9wZQ.c2ln").unwrap();
        assert!(decode_claims_unverified(&jwt).is_err());
    }

    #[test]
    fn test_decode_connector_tokens() {
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(r#"{"google":"g-token","slack":"s-token"}"#);
        let tokens = decode_connector_tokens(&encoded).unwrap();
        assert_eq!(tokens.get("google"), Some("g-token"));
        assert_eq!(tokens.len(), 2);

        assert!(decode_connector_tokens("").unwrap().is_empty());
        assert!(decode_connector_tokens("%%%").is_err());

        let not_object = base64::engine::general_purpose::URL_SAFE.encode("[1,2]");
        assert!(decode_connector_tokens(&not_object).is_err());
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("bearer abc"));
        headers.insert("x-api-key", HeaderValue::from_static("key-1"));
        let raw = RawCredential::from_headers(&headers, &HeaderNames::default());

        let summary = raw.summary();
        assert!(summary.bearer);
        assert_eq!(summary.bearer_len, 3);
        assert!(summary.api_key);
        assert!(!summary.id_token);
    }

    #[test]
    fn test_non_bearer_authorization_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        let raw = RawCredential::from_headers(&headers, &HeaderNames::default());
        assert!(raw.is_empty());
        assert!(raw.interpret(PayloadKind::Composite).is_none());
        assert!(raw.interpret(PayloadKind::IdToken).is_none());
    }

    #[test]
    fn test_split_headers_preferred() {
        let connectors = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"google":"g"}"#);
        let raw = RawCredential::default()
            .with_bearer(composite(Some("other"), None, &[]).encode())
            .with_id_token(JWT)
            .with_connector_tokens(connectors)
            .with_server_secret("s");

        let Some(Ok(ParsedAuthPayload::Composite(token))) = raw.interpret(PayloadKind::Composite)
        else {
            panic!("expected composite payload");
        };
        assert_eq!(token.server_secret.as_deref(), Some("s"));
        assert_eq!(token.user_id_token.as_deref(), Some(JWT));
        assert_eq!(token.connector_access_tokens.get("google"), Some("g"));
    }

    #[test]
    fn test_split_header_bad_id_token_is_malformed() {
        let raw = RawCredential::default().with_id_token("not-a-jwt");
        assert!(matches!(
            raw.interpret(PayloadKind::IdToken),
            Some(Err(AuthError::MalformedCredential(_)))
        ));
    }

    #[test]
    fn test_id_token_interpretations() {
        let raw = RawCredential::default().with_bearer(JWT);
        assert!(matches!(
            raw.interpret(PayloadKind::IdToken),
            Some(Ok(ParsedAuthPayload::BareJwt(_)))
        ));

        let raw = RawCredential::default().with_bearer(composite(None, Some(JWT), &[]).encode());
        let payload = raw.interpret(PayloadKind::IdToken).unwrap().unwrap();
        assert_eq!(payload.id_token().unwrap().unwrap().as_str(), JWT);

        let raw = RawCredential::default().with_bearer("a.b");
        assert!(matches!(
            raw.interpret(PayloadKind::IdToken),
            Some(Err(AuthError::MalformedCredential(_)))
        ));
    }

    #[test]
    fn test_bearer_never_forwards_envelope() {
        let envelope = composite(Some("server-secret"), Some(JWT), &[]).encode();
        let raw = RawCredential::default().with_bearer(envelope);

        let payload = raw.interpret(PayloadKind::Bearer).unwrap().unwrap();
        assert_eq!(payload, ParsedAuthPayload::opaque_token(JWT));
        assert!(raw.interpret(PayloadKind::ApiKey).is_none());

        let raw = RawCredential::default().with_bearer(composite(Some("s"), None, &[]).encode());
        assert!(raw.interpret(PayloadKind::Bearer).is_none());
    }

    #[test]
    fn test_api_key_sources() {
        let raw = RawCredential::default().with_api_key("k1").with_bearer("api-key-123");
        assert_eq!(
            raw.interpret(PayloadKind::ApiKey).unwrap().unwrap(),
            ParsedAuthPayload::opaque_token("k1")
        );

        let raw = RawCredential::default().with_bearer("api-key-123");
        assert_eq!(
            raw.interpret(PayloadKind::ApiKey).unwrap().unwrap(),
            ParsedAuthPayload::opaque_token("api-key-123")
        );
        assert!(matches!(
            raw.interpret(PayloadKind::Composite),
            Some(Err(AuthError::MalformedCredential(_)))
        ));
    }

    #[test]
    fn test_opaque_payloads_carry_connectors() {
        let envelope = composite(None, Some("opaque-user-token"), &[("google", "g")]).encode();
        let raw = RawCredential::default().with_bearer(envelope.clone());
        let payload = raw.interpret(PayloadKind::Bearer).unwrap().unwrap();
        assert_eq!(payload.opaque().unwrap(), "opaque-user-token");
        assert_eq!(payload.connector_tokens().get("google"), Some("g"));

        let raw = RawCredential::default().with_api_key("k1").with_bearer(envelope);
        let payload = raw.interpret(PayloadKind::ApiKey).unwrap().unwrap();
        assert_eq!(payload.opaque().unwrap(), "k1");
        assert_eq!(payload.connector_tokens().get("google"), Some("g"));

        let connectors = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"slack":"s"}"#);
        let raw = RawCredential::default()
            .with_api_key("k1")
            .with_connector_tokens(connectors);
        let payload = raw.interpret(PayloadKind::ApiKey).unwrap().unwrap();
        assert_eq!(payload.connector_tokens().names(), vec!["slack"]);

        let raw = RawCredential::default()
            .with_api_key("k1")
            .with_connector_tokens("%%%");
        assert!(matches!(
            raw.interpret(PayloadKind::ApiKey),
            Some(Err(AuthError::MalformedCredential(_)))
        ));
    }

    #[test]
    fn test_bearer_reads_split_id_token_header() {
        let connectors = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"google":"g"}"#);
        let raw = RawCredential::default()
            .with_id_token("aaa.bbb.ccc")
            .with_connector_tokens(connectors);

        let payload = raw.interpret(PayloadKind::Bearer).unwrap().unwrap();
        assert_eq!(payload.opaque().unwrap(), "aaa.bbb.ccc");
        assert_eq!(payload.connector_tokens().get("google"), Some("g"));

        let raw = RawCredential::default().with_server_secret("s");
        assert!(raw.interpret(PayloadKind::Bearer).is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let token = composite(Some("super-secret"), Some(JWT), &[("google", "g-secret")]);
        let debug = format!("{:?}", ParsedAuthPayload::Composite(token));
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("g-secret"));
        assert!(!debug.contains(JWT));

        let raw = RawCredential::default().with_api_key("my-key");
        assert!(!format!("{:?}", raw).contains("my-key"));
    }
}
