//! Handler for the `whoami` tool.
//!
//! Reports the identity and connector names of the caller of this tool call.

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;

use crate::api::WhoAmI;
use crate::tools::{ToolContext, ToolHandler};

#[derive(Debug, Default, Clone, Copy)]
pub struct WhoAmIHandler;

impl WhoAmIHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ToolHandler for WhoAmIHandler {
    fn name(&self) -> &str {
        "whoami"
    }

    fn title(&self) -> Option<&str> {
        Some("Who am I")
    }

    fn description(&self) -> &str {
        "Report whether this call is authenticated, the caller's email if known, \
         and the names of connectors the caller supplied tokens for."
    }

    fn input_schema(&self) -> JsonObject {
        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), json!({}));
        schema
    }

    fn output_schema(&self) -> Option<JsonObject> {
        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert(
            "properties".to_string(),
            json!({
                "authenticated": {"type": "boolean"},
                "email": {"type": ["string", "null"]},
                "connectors": {"type": "array", "items": {"type": "string"}}
            }),
        );
        schema.insert(
            "required".to_string(),
            json!(["authenticated", "email", "connectors"]),
        );
        Some(schema)
    }

    fn execute(
        &self,
        _args: JsonObject,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        let user = ctx.current_user().ok();

        Box::pin(async move {
            let payload = serde_json::to_value(WhoAmI::from_user(user.as_deref()))?;
            let text = serde_json::to_string(&payload)
                .unwrap_or_else(|_| "internal serialization error".to_string());

            Ok(CallToolResult {
                content: vec![Content::text(text)],
                structured_content: Some(payload),
                is_error: Some(false),
                meta: None,
            })
        })
    }
}
