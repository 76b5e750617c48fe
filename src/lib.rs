//! Authentication gate for MCP tool servers.
//!
//! Requests to protected routes are authenticated by an ordered chain of
//! strategies (shared secret, JWT, token introspection, trusted OIDC issuers,
//! custom validators, static API keys). The resolved identity and per-connector
//! access tokens are stored per request and handed to MCP tools through their
//! [`ToolContext`].

pub mod api;
pub mod auth;
pub mod config;
pub mod gate;
pub mod server;
pub mod tools;

pub use auth::{
    AuthChain, AuthError, AuthOutcome, AuthenticatedUser, CompositeToken, ConnectorTokenSet,
    ContextError, IdentityContexts, RequestHandle, UserIdentity,
};
pub use config::{AuthProvider, GateSettings, ProviderConfig};
pub use gate::{AuthGate, CurrentUser, MaybeUser, PolicyTable, RouteAuthPolicy};
pub use server::{GatedMcpServer, build_app, start_http};
pub use tools::{ToolContext, ToolHandler, ToolRegistry};
