use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{env, fmt, fs, path::Path, path::PathBuf, sync::Arc};

use crate::auth::credentials::HeaderNames;
use crate::auth::observer::{AuthObserver, observer_for};
use crate::auth::strategies::{
    ApiKeyStrategy, AuthStrategy, CustomStrategy, IntrospectionConfig, IntrospectionStrategy,
    JwtConfig, JwtStrategy, SecretStrategy, TokenValidator, TrustedIssuersConfig,
    TrustedIssuersStrategy,
};
use crate::auth::AuthError;
use crate::gate::{PolicyTable, RouteAuthPolicy};

/// One provider entry of the `providers` list in `auth.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    Secret { secret: String },
    Jwt(JwtConfig),
    Introspection(IntrospectionConfig),
    ApiKey { valid_keys: Vec<String> },
    TrustedIssuers(TrustedIssuersConfig),
}

/// A provider as the chain sees it: file configuration, or a validator
/// supplied from code.
#[derive(Clone, Deserialize)]
#[serde(from = "ProviderConfig")]
pub enum AuthProvider {
    Config(ProviderConfig),
    Custom(Arc<dyn TokenValidator>),
}

impl AuthProvider {
    pub fn custom(validator: impl TokenValidator) -> Self {
        Self::Custom(Arc::new(validator))
    }

    /// Provider type label, as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(ProviderConfig::Secret { .. }) => "secret",
            Self::Config(ProviderConfig::Jwt(_)) => "jwt",
            Self::Config(ProviderConfig::Introspection(_)) => "introspection",
            Self::Config(ProviderConfig::ApiKey { .. }) => "api_key",
            Self::Config(ProviderConfig::TrustedIssuers(_)) => "trusted_issuers",
            Self::Custom(_) => "custom",
        }
    }

    /// Construct the strategy, validating the configuration.
    pub fn build(self) -> Result<Arc<dyn AuthStrategy>, AuthError> {
        let strategy: Arc<dyn AuthStrategy> = match self {
            Self::Config(ProviderConfig::Secret { secret }) => Arc::new(SecretStrategy::new(secret)?),
            Self::Config(ProviderConfig::Jwt(config)) => Arc::new(JwtStrategy::new(config)?),
            Self::Config(ProviderConfig::Introspection(config)) => {
                Arc::new(IntrospectionStrategy::new(config)?)
            }
            Self::Config(ProviderConfig::ApiKey { valid_keys }) => {
                Arc::new(ApiKeyStrategy::new(valid_keys)?)
            }
            Self::Config(ProviderConfig::TrustedIssuers(config)) => {
                Arc::new(TrustedIssuersStrategy::new(config)?)
            }
            Self::Custom(validator) => Arc::new(CustomStrategy::new(validator)),
        };
        Ok(strategy)
    }
}

impl From<ProviderConfig> for AuthProvider {
    fn from(config: ProviderConfig) -> Self {
        Self::Config(config)
    }
}

impl fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Provider configs hold secrets; only the type is printed.
        write!(f, "AuthProvider({})", self.kind())
    }
}

/// Everything the gate needs, as loaded from `auth.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Strategies in evaluation order.
    pub providers: Vec<AuthProvider>,
    pub debug: bool,
    /// Extra exact paths that require authentication.
    pub protected_paths: Vec<String>,
    /// Extra path prefixes that require authentication.
    pub protected_prefixes: Vec<String>,
    /// Paths that skip authentication entirely.
    pub public_paths: Vec<String>,
    pub headers: HeaderNames,
}

impl GateSettings {
    pub fn new(providers: Vec<AuthProvider>) -> Self {
        Self {
            providers,
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<AuthProvider>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Parse settings JSON, expanding `${VAR}` references in string values.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let mut value: Value = serde_json::from_str(raw)?;
        expand_value(&mut value);
        Ok(serde_json::from_value(value)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Self::from_json_str(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid auth config {}: {}", path.display(), e))
    }

    /// Providers built from a shared secret and/or static API keys, for
    /// deployments without a config file.
    pub fn from_secret_and_keys(secret: Option<String>, api_keys: Vec<String>) -> Self {
        let mut settings = Self::default();
        if let Some(secret) = secret {
            settings = settings.with_provider(ProviderConfig::Secret { secret });
        }
        if !api_keys.is_empty() {
            settings = settings.with_provider(ProviderConfig::ApiKey {
                valid_keys: api_keys,
            });
        }
        settings
    }

    pub fn auth_providers(&self) -> Vec<AuthProvider> {
        self.providers.clone()
    }

    pub fn observer(&self) -> Arc<dyn AuthObserver> {
        observer_for(self.debug)
    }

    /// Route policies: protocol defaults plus the configured overrides.
    pub fn policy_table(&self) -> PolicyTable {
        let mut table = PolicyTable::protocol_defaults();
        for path in &self.protected_paths {
            table = table.route(path, RouteAuthPolicy::Required);
        }
        for prefix in &self.protected_prefixes {
            table = table.prefix(prefix, RouteAuthPolicy::Required);
        }
        for path in &self.public_paths {
            table = table.route(path, RouteAuthPolicy::None);
        }
        table
    }

    /// Header names must be valid HTTP header names.
    pub fn check_headers(&self) -> Result<(), AuthError> {
        let names = [
            &self.headers.id_token,
            &self.headers.connector_tokens,
            &self.headers.server_secret,
            &self.headers.api_key,
        ];
        for name in names {
            http::HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                AuthError::misconfigured(format!("invalid header name '{}'", name))
            })?;
        }
        Ok(())
    }
}

pub fn resolve_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(p) = env::var("TOOLGATE_CONFIG") {
        return Ok(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("toolgate").join("auth.json");
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let candidate = PathBuf::from("auth.json");
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow::anyhow!(
        "Could not find auth.json (set TOOLGATE_CONFIG or create ./auth.json)"
    ))
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_value(value: &mut Value) {
    match value {
        Value::String(s) => *s = expand_env_vars(s),
        Value::Array(items) => items.iter_mut().for_each(expand_value),
        Value::Object(map) => map.values_mut().for_each(expand_value),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"{
        "debug": true,
        "providers": [
            {"type": "jwt", "secret_or_key": "k", "algorithm": "HS256", "email_claim": "sub"},
            {"type": "secret", "secret": "${TOOLGATE_TEST_SECRET}"},
            {"type": "api_key", "valid_keys": ["a", "b"]},
            {"type": "introspection", "endpoint": "https://auth.example.com/introspect",
             "client_id": "c", "client_secret": "s", "timeout_ms": 250},
            {"type": "trusted_issuers", "issuers": ["https://accounts.example.com"]}
        ],
        "public_paths": ["/status"],
        "protected_prefixes": ["/admin/"],
        "headers": {"id_token": "X-North-ID-Token"}
    }"#;

    #[test]
    fn test_parse_settings() {
        // SAFETY: the variable name is unique to this test.
        unsafe { env::set_var("TOOLGATE_TEST_SECRET", "from-env") };
        let settings = GateSettings::from_json_str(CONFIG).unwrap();

        assert!(settings.debug);
        let kinds: Vec<_> = settings.providers.iter().map(AuthProvider::kind).collect();
        assert_eq!(
            kinds,
            vec!["jwt", "secret", "api_key", "introspection", "trusted_issuers"]
        );
        match &settings.providers[1] {
            AuthProvider::Config(ProviderConfig::Secret { secret }) => {
                assert_eq!(secret, "from-env")
            }
            other => panic!("unexpected provider {:?}", other),
        }
        assert_eq!(settings.headers.id_token, "X-North-ID-Token");
        assert_eq!(settings.headers.api_key, "X-API-Key");

        for provider in settings.auth_providers() {
            provider.build().unwrap();
        }
    }

    #[test]
    fn test_unknown_provider_type_is_rejected() {
        let err = GateSettings::from_json_str(r#"{"providers": [{"type": "kerberos"}]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_bad_provider_fails_at_build() {
        let settings = GateSettings::from_json_str(
            r#"{"providers": [{"type": "jwt", "secret_or_key": "k", "algorithm": "none"}]}"#,
        )
        .unwrap();
        let err = settings.providers[0].clone().build().err().unwrap();
        assert!(matches!(err, AuthError::ProviderMisconfigured(_)));
    }

    #[test]
    fn test_policy_table_overrides() {
        let settings = GateSettings::from_json_str(CONFIG).unwrap();
        let table = settings.policy_table();
        assert_eq!(table.resolve("/mcp"), RouteAuthPolicy::Required);
        assert_eq!(table.resolve("/admin/users"), RouteAuthPolicy::Required);
        assert_eq!(table.resolve("/status"), RouteAuthPolicy::None);
        assert_eq!(table.resolve("/whoami"), RouteAuthPolicy::Optional);
    }

    #[test]
    fn test_check_headers() {
        let mut settings = GateSettings::default();
        assert!(settings.check_headers().is_ok());
        settings.headers.api_key = "bad header".to_string();
        assert!(settings.check_headers().is_err());
    }

    #[test]
    fn test_from_secret_and_keys() {
        let settings = GateSettings::from_secret_and_keys(
            Some("s".to_string()),
            vec!["k1".to_string()],
        );
        let kinds: Vec<_> = settings.providers.iter().map(AuthProvider::kind).collect();
        assert_eq!(kinds, vec!["secret", "api_key"]);
        assert!(GateSettings::from_secret_and_keys(None, Vec::new()).providers.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"providers": [{{"type": "secret", "secret": "s"}}]}}"#).unwrap();
        let settings = GateSettings::load(file.path()).unwrap();
        assert_eq!(settings.providers.len(), 1);
        assert!(GateSettings::load(Path::new("/nonexistent/auth.json")).is_err());
    }

    #[test]
    fn test_expand_env_vars_keeps_unknown() {
        assert_eq!(
            expand_env_vars("${TOOLGATE_SURELY_UNSET_VAR}/x"),
            "${TOOLGATE_SURELY_UNSET_VAR}/x"
        );
        assert_eq!(expand_env_vars("plain"), "plain");
    }

    #[test]
    fn test_provider_debug_hides_secrets() {
        let provider: AuthProvider = ProviderConfig::Secret {
            secret: "hunter2".to_string(),
        }
        .into();
        assert_eq!(format!("{:?}", provider), "AuthProvider(secret)");
    }
}
