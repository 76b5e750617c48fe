//! Tool handler registry for managing MCP tool implementations.
//!
//! Tools receive a [`ToolContext`] bound to the HTTP request that carried the
//! call, which is how they reach the caller's identity and connector tokens.

mod registry;

pub use registry::{ToolContext, ToolHandler, ToolRegistry};

// Tool handler implementations
mod whoami;

pub use whoami::WhoAmIHandler;
