//! # codial-mcp
//!
//! MCP (Model Context Protocol) client: JSON-RPC 2.0 over HTTP with
//! bearer auth, the `initialize` / `notifications/initialized` lifecycle,
//! auto-paginating discovery (`tools/list`, `prompts/list`,
//! `resources/list`, `resources/templates/list`), `tools/call`, and `ping`.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod protocol;

pub use client::McpClient;
pub use errors::McpError;
pub use protocol::{
    McpInitializeResult, McpPrompt, McpPromptArgument, McpResource, McpResourceTemplate, McpTool,
    JSONRPC_VERSION, MCP_PROTOCOL_VERSION,
};
