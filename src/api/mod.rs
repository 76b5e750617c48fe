// Operational HTTP endpoints served next to the MCP transport

use axum::{Router, http::StatusCode, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthenticatedUser;
use crate::gate::MaybeUser;

/// Body of `GET /whoami`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmI {
    pub authenticated: bool,
    pub email: Option<String>,
    /// Connector names only, sorted. Tokens are never echoed.
    pub connectors: Vec<String>,
}

impl WhoAmI {
    pub fn from_user(user: Option<&AuthenticatedUser>) -> Self {
        match user {
            Some(user) => Self {
                authenticated: true,
                email: user.email().map(str::to_string),
                connectors: user.connector_tokens().names(),
            },
            None => Self {
                authenticated: false,
                email: None,
                connectors: Vec::new(),
            },
        }
    }
}

pub fn create_router() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/whoami", get(whoami))
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Reports the context state of the current request without enforcing auth.
async fn whoami(MaybeUser(user): MaybeUser) -> Json<WhoAmI> {
    Json(WhoAmI::from_user(user.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ConnectorTokenSet, UserIdentity};

    #[test]
    fn test_whoami_from_user() {
        let user = AuthenticatedUser::new(
            UserIdentity::new("user@example.com", Default::default()),
            [("slack", "s"), ("google", "g")]
                .into_iter()
                .collect::<ConnectorTokenSet>(),
        );
        let body = WhoAmI::from_user(Some(&user));
        assert!(body.authenticated);
        assert_eq!(body.email.as_deref(), Some("user@example.com"));
        assert_eq!(body.connectors, vec!["google", "slack"]);

        let anonymous = WhoAmI::from_user(None);
        assert_eq!(
            serde_json::to_value(anonymous).unwrap(),
            serde_json::json!({"authenticated": false, "email": null, "connectors": []})
        );
    }
}
