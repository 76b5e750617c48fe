//! Tool registry for managing MCP tool handlers.
//!
//! Provides a `ToolHandler` trait for implementing tools and a `ToolRegistry`
//! for registering and invoking them.

use anyhow::Result;
use rmcp::RoleServer;
use rmcp::model::{CallToolResult, JsonObject, Tool as McpTool};
use rmcp::service::RequestContext;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::auth::{AuthenticatedUser, ContextError, RequestHandle};

/// Type alias for HTTP request parts stored in rmcp extensions.
type HttpParts = http::request::Parts;

/// Context passed to tool handlers during execution.
///
/// Carries the handle of the HTTP request that delivered the tool call, so a
/// tool only ever sees its own caller's identity.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    handle: Option<RequestHandle>,
}

impl ToolContext {
    pub fn new(handle: Option<RequestHandle>) -> Self {
        Self { handle }
    }

    /// Read the gate's handle from the HTTP parts rmcp attaches to a request.
    pub fn from_request_context(context: &RequestContext<RoleServer>) -> Self {
        let handle = context
            .extensions
            .get::<HttpParts>()
            .and_then(|parts| RequestHandle::from_extensions(&parts.extensions));
        Self { handle }
    }

    /// The authenticated caller.
    pub fn current_user(&self) -> Result<Arc<AuthenticatedUser>, ContextError> {
        self.handle
            .as_ref()
            .ok_or(ContextError::NoAuthenticatedUser)?
            .current_user()
    }

    /// Access token for a connector, if the caller presented one.
    pub fn connector_token(&self, connector: &str) -> Option<String> {
        let user = self.current_user().ok()?;
        user.connector_tokens().get(connector).map(str::to_string)
    }
}

/// Trait for handling MCP tool invocations.
///
/// Each tool implements this trait to define its schema and execution logic.
pub trait ToolHandler: Send + Sync {
    /// Returns the tool's name (e.g., "whoami").
    fn name(&self) -> &str;

    /// Returns the tool's human-readable title.
    fn title(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> &str;

    fn input_schema(&self) -> JsonObject;

    fn output_schema(&self) -> Option<JsonObject> {
        None
    }

    /// Executes the tool with the given arguments.
    fn execute(
        &self,
        args: JsonObject,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<CallToolResult>> + Send + '_>>;

    /// Converts this handler to an `McpTool` for use in `list_tools`.
    fn to_mcp_tool(&self) -> McpTool {
        use std::borrow::Cow;

        McpTool {
            name: Cow::Owned(self.name().to_string()),
            title: self.title().map(|s| s.to_string()),
            description: Some(Cow::Owned(self.description().to_string())),
            input_schema: Arc::new(self.input_schema()),
            output_schema: self.output_schema().map(Arc::new),
            annotations: None,
            icons: None,
            meta: None,
        }
    }
}

/// Registry for managing tool handlers.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool handler from a type that implements `ToolHandler`.
    pub fn register_handler<T: ToolHandler + 'static>(mut self, handler: T) -> Self {
        self.handlers
            .insert(handler.name().to_string(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    /// All registered tools, sorted by name.
    pub fn list_tools(&self) -> Vec<McpTool> {
        let mut tools: Vec<McpTool> = self
            .handlers
            .values()
            .map(|handler| handler.to_mcp_tool())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Execute a tool by name with the given arguments.
    pub async fn call_tool(
        &self,
        name: &str,
        args: JsonObject,
        ctx: &ToolContext,
    ) -> Result<CallToolResult> {
        let handler = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Tool not found: {}", name))?;
        handler.execute(args, ctx).await
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
