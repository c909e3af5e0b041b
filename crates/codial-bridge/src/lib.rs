//! # codial-bridge
//!
//! Provider bridges: the narrow capability behind which model vendors sit.
//! A bridge takes one composed request (system context, conversation text,
//! attachments, tool manifest, accumulated tool results) and returns either
//! a terminal answer or a batch of tool requests.
//!
//! New providers are added by extending the [`catalog`] factory table; the
//! rest of the system only sees `Arc<dyn ProviderBridge>`.

#![deny(unsafe_code)]

pub mod catalog;
pub mod copilot_auth;
pub mod http_bridge;
pub mod manager;
pub mod provider;

pub use catalog::{build_bridges, choose_default_provider, validate_enabled_providers, BridgeSettings};
pub use copilot_auth::{CopilotAuthBootstrapper, CopilotAuthConfig};
pub use http_bridge::HttpBridge;
pub use manager::ProviderManager;
pub use provider::{
    BridgeError, BridgeRequest, BridgeResponse, ProviderBridge, SystemContext, ToolRequest,
    ToolResult, ToolSpec,
};
