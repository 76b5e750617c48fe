use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a route treats authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAuthPolicy {
    /// Reject the request unless a strategy authenticates it.
    Required,
    /// Authenticate if possible; the handler runs either way.
    Optional,
    /// Skip authentication entirely.
    None,
}

/// Route to policy bindings, fixed at startup.
///
/// Lookup order: exact path, then the longest matching prefix, then the
/// fallback. Exact paths ignore a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    routes: HashMap<String, RouteAuthPolicy>,
    prefixes: Vec<(String, RouteAuthPolicy)>,
    fallback: RouteAuthPolicy,
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

impl PolicyTable {
    pub fn new(fallback: RouteAuthPolicy) -> Self {
        Self {
            routes: HashMap::new(),
            prefixes: Vec::new(),
            fallback,
        }
    }

    /// MCP transport endpoints are protected, `/health` is public, and any
    /// other route gets optional authentication.
    pub fn protocol_defaults() -> Self {
        Self::new(RouteAuthPolicy::Optional)
            .route("/mcp", RouteAuthPolicy::Required)
            .prefix("/mcp/", RouteAuthPolicy::Required)
            .route("/sse", RouteAuthPolicy::Required)
            .prefix("/messages/", RouteAuthPolicy::Required)
            .route("/health", RouteAuthPolicy::None)
    }

    pub fn route(mut self, path: &str, policy: RouteAuthPolicy) -> Self {
        self.routes.insert(normalize(path).to_string(), policy);
        self
    }

    pub fn prefix(mut self, prefix: &str, policy: RouteAuthPolicy) -> Self {
        self.prefixes.retain(|(p, _)| p != prefix);
        self.prefixes.push((prefix.to_string(), policy));
        // Longest first so the most specific prefix wins.
        self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    pub fn fallback(mut self, policy: RouteAuthPolicy) -> Self {
        self.fallback = policy;
        self
    }

    pub fn resolve(&self, path: &str) -> RouteAuthPolicy {
        if let Some(policy) = self.routes.get(normalize(path)) {
            return *policy;
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, policy)| *policy)
            .unwrap_or(self.fallback)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::protocol_defaults()
    }
}
