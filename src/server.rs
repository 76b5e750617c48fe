//! MCP server implementation using rmcp, served behind the auth gate.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::GateSettings;
use crate::gate::AuthGate;
use crate::tools::{ToolContext, ToolRegistry, WhoAmIHandler};

/// MCP server whose tools read the caller identity from their own request.
///
/// The server holds no identity itself: each tool call resolves the handle the
/// gate attached to the HTTP request that delivered it.
#[derive(Clone)]
pub struct GatedMcpServer {
    tool_registry: Arc<ToolRegistry>,
}

impl GatedMcpServer {
    pub fn new(tool_registry: Arc<ToolRegistry>) -> Self {
        Self { tool_registry }
    }

    /// Server with the built-in tools registered.
    pub fn with_default_tools() -> Self {
        Self::new(Arc::new(default_tools()))
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tool_registry
    }
}

pub fn default_tools() -> ToolRegistry {
    ToolRegistry::new().register_handler(WhoAmIHandler::new())
}

impl ServerHandler for GatedMcpServer {
    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let result = ListToolsResult {
            tools: self.tool_registry.list_tools(),
            next_cursor: None,
            ..Default::default()
        };
        std::future::ready(Ok(result))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let tool_name = request.name.to_string();
        let args = request.arguments.unwrap_or_default();
        let registry = self.tool_registry.clone();
        let ctx = ToolContext::from_request_context(&context);

        async move {
            if !registry.contains(&tool_name) {
                return Err(McpError::invalid_params(
                    format!("Tool not found: {}", tool_name),
                    None,
                ));
            }
            registry
                .call_tool(&tool_name, args, &ctx)
                .await
                .map_err(|e| McpError::internal_error(format!("Tool execution failed: {}", e), None))
        }
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Authenticated MCP endpoint. Tools act on behalf of the caller identified \
                 by the request's credentials; call `whoami` to inspect it."
                    .to_string(),
            ),
        }
    }
}

/// The full HTTP application: MCP at `/mcp` plus the operational routes, all
/// behind the gate.
pub fn build_app(gate: AuthGate, tool_registry: Arc<ToolRegistry>) -> Router {
    let service = StreamableHttpService::new(
        move || Ok(GatedMcpServer::new(tool_registry.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let routes = Router::new()
        .nest_service("/mcp", service)
        .merge(api::create_router());

    gate.wrap(routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

/// Serve the gated MCP endpoint over Streamable HTTP.
///
/// Provider configuration is validated before the listener binds; a
/// misconfigured provider aborts startup.
pub async fn start_http(settings: GateSettings, bind: &str) -> Result<()> {
    let gate = AuthGate::from_settings(&settings)?;
    let strategies = gate.chain().strategy_names();
    let app = build_app(gate, Arc::new(default_tools()));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(
        providers = ?strategies,
        debug = settings.debug,
        "MCP HTTP server listening on http://{}",
        bind
    );

    axum::serve(listener, app).await?;

    Ok(())
}
