use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use futures::StreamExt;
use serde_json::json;

use crate::auth::chain::AuthChain;
use crate::auth::context::{IdentityContexts, IdentityScope};
use crate::auth::credentials::{HeaderNames, RawCredential};
use crate::auth::AuthError;
use crate::auth::observer::AuthObserver;
use crate::config::GateSettings;
use crate::gate::policy::{PolicyTable, RouteAuthPolicy};

/// The only rejection the gate produces. Carries no diagnostic detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    Unauthorized,
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

impl std::error::Error for GateRejection {}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({"error": "unauthorized"})),
        )
            .into_response()
    }
}

/// Per-route authentication gate.
///
/// Resolves the route policy, runs the chain, and either rejects the request or
/// passes it on with a [`RequestHandle`](crate::auth::RequestHandle) in its
/// extensions.
#[derive(Clone)]
pub struct AuthGate {
    chain: AuthChain,
    policies: Arc<PolicyTable>,
    headers: Arc<HeaderNames>,
    contexts: IdentityContexts,
}

impl AuthGate {
    pub fn new(chain: AuthChain, policies: PolicyTable) -> Self {
        Self {
            chain,
            policies: Arc::new(policies),
            headers: Arc::new(HeaderNames::default()),
            contexts: IdentityContexts::new(),
        }
    }

    /// Build the chain and policy table; any misconfiguration is fatal.
    pub fn from_settings(settings: &GateSettings) -> Result<Self, AuthError> {
        settings.check_headers()?;
        let chain = AuthChain::from_settings(settings)?;
        Ok(Self::new(chain, settings.policy_table()).with_headers(settings.headers.clone()))
    }

    pub fn with_headers(mut self, headers: HeaderNames) -> Self {
        self.headers = Arc::new(headers);
        self
    }

    pub fn chain(&self) -> &AuthChain {
        &self.chain
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn contexts(&self) -> &IdentityContexts {
        &self.contexts
    }

    fn observer(&self) -> &Arc<dyn AuthObserver> {
        self.chain.observer()
    }

    /// Decide one request.
    ///
    /// `Ok(None)`: the route skips auth. `Ok(Some(scope))`: continue with this
    /// context (set, or empty on optional routes). `Err`: reject.
    pub async fn check(
        &self,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<Option<IdentityScope>, GateRejection> {
        let policy = self.policies.resolve(path);
        if policy == RouteAuthPolicy::None {
            self.observer().request_gated(path, policy, false);
            return Ok(None);
        }

        let raw = RawCredential::from_headers(headers, &self.headers);
        let outcome = self.chain.authenticate(&raw).await;
        self.observer()
            .request_gated(path, policy, outcome.is_authenticated());

        match outcome.into_user() {
            Some(user) => Ok(Some(self.contexts.open_authenticated(user))),
            None if policy == RouteAuthPolicy::Required => Err(GateRejection::Unauthorized),
            None => Ok(Some(self.contexts.open())),
        }
    }

    /// Put the gate in front of every route of `router`.
    pub fn wrap(self, router: Router) -> Router {
        router.layer(axum::middleware::from_fn_with_state(self, gate_middleware))
    }
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("chain", &self.chain)
            .field("policies", &self.policies)
            .finish()
    }
}

/// axum middleware entry point for [`AuthGate`].
pub async fn gate_middleware(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let headers = request.headers().clone();
    let scope = match gate.check(&path, &headers).await {
        Ok(Some(scope)) => scope,
        Ok(None) => return next.run(request).await,
        Err(rejection) => return rejection.into_response(),
    };

    request.extensions_mut().insert(scope.handle());
    let response = next.run(request).await;

    // The context must stay readable while the body streams (SSE); it is torn
    // down when the body finishes or is dropped.
    let (parts, body) = response.into_parts();
    let stream = body.into_data_stream().map(move |chunk| {
        let _held = &scope;
        chunk
    });
    Response::from_parts(parts, Body::from_stream(stream))
}
