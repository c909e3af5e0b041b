//! # Provider bridge trait
//!
//! Core abstraction over model vendors. Every bridge implements
//! [`ProviderBridge`] to expose a single request/response capability:
//! `generate` takes the composed turn state and returns either a terminal
//! answer or a batch of tool requests for the next round.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use codial_core::attachments::TurnAttachment;
use codial_core::errors::codes;
use codial_core::ids::ToolCallId;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur talking to a provider bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The bridge's base URL is not configured.
    #[error("provider `{provider}` bridge is not configured")]
    NotConfigured {
        /// Provider name.
        provider: String,
    },

    /// The selected provider is not in the enabled set.
    #[error("provider `{provider}` is not enabled (enabled: {enabled})")]
    NotEnabled {
        /// Provider name.
        provider: String,
        /// Comma-joined enabled set.
        enabled: String,
    },

    /// The request exceeded its deadline.
    #[error("provider `{provider}` bridge request timed out")]
    Timeout {
        /// Provider name.
        provider: String,
    },

    /// Connection-level transport failure.
    #[error("bridge transport error: {message}")]
    Transport {
        /// Error description.
        message: String,
    },

    /// The bridge rejected our credentials.
    #[error("bridge auth failed: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Rate limited by the bridge.
    #[error("bridge rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
    },

    /// The bridge returned an HTTP error status.
    #[error("bridge error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
    },

    /// The response body violated the bridge contract.
    #[error("bridge protocol error: {message}")]
    Protocol {
        /// Error description.
        message: String,
    },
}

impl BridgeError {
    /// Whether this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotConfigured { .. }
            | Self::NotEnabled { .. }
            | Self::Auth { .. }
            | Self::Protocol { .. } => false,
        }
    }

    /// Extract a suggested retry delay, if the bridge provided one.
    #[must_use]
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Stable wire code for this error.
    #[must_use]
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } | Self::Protocol { .. } => codes::BRIDGE_TRANSPORT,
            Self::NotEnabled { .. } => codes::PROVIDER_NOT_ENABLED,
            Self::Timeout { .. } => codes::BRIDGE_TIMEOUT,
            Self::Transport { .. } => codes::BRIDGE_TRANSPORT,
            Self::Auth { .. } => codes::PROVIDER_AUTH_FAILED,
            Self::RateLimited { .. } => codes::RATE_LIMITED,
            Self::Api { status, .. } => {
                if *status == 429 {
                    codes::RATE_LIMITED
                } else {
                    codes::BRIDGE_TRANSPORT
                }
            }
        }
    }

    /// Map a `reqwest` failure for `provider` into a [`BridgeError`].
    #[must_use]
    pub fn from_reqwest(provider: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_owned(),
            }
        } else {
            Self::Transport {
                message: err.to_string(),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool manifest and results
// ─────────────────────────────────────────────────────────────────────────────

/// One tool advertised to the bridge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description for the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments object.
    pub input_schema: Value,
    /// JSON schema of the result, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// A tool invocation requested by the bridge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Bridge-assigned call id, echoed back in the matching result.
    pub tool_call_id: ToolCallId,
    /// Tool name.
    pub name: String,
    /// Arguments object.
    pub arguments: Value,
}

/// The outcome of one tool invocation, fed into the next round.
///
/// A failed tool call is *not* retried; it travels to the bridge as
/// `ok: false` with the error text so the model can react.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call id this result answers.
    pub tool_call_id: ToolCallId,
    /// Tool name.
    pub name: String,
    /// Whether the call succeeded.
    pub ok: bool,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// A successful result.
    #[must_use]
    pub fn ok(tool_call_id: ToolCallId, name: impl Into<String>, result: Value) -> Self {
        Self {
            tool_call_id,
            name: name.into(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn err(tool_call_id: ToolCallId, name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id,
            name: name.into(),
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / response
// ─────────────────────────────────────────────────────────────────────────────

/// The provider-agnostic system context composed from the policy snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemContext {
    /// Rules headline.
    pub rules_summary: String,
    /// Agents headline.
    pub agents_summary: String,
    /// Comma-joined skill names.
    pub skills_summary: String,
    /// Memory-chain headline, extended by subagent memory.
    pub memory_summary: String,
}

/// One bridge call within a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    /// Owning session.
    pub session_id: String,
    /// Requesting user.
    pub user_id: String,
    /// Provider name (matches the bridge being called).
    pub provider: String,
    /// Effective model for this turn.
    pub model: String,
    /// Effective conversation text (subagent prompt already applied).
    pub text: String,
    /// Attachment references.
    pub attachments: Vec<TurnAttachment>,
    /// Whether MCP tooling is active for this turn.
    pub mcp_enabled: bool,
    /// Selected MCP profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_profile_name: Option<String>,
    /// Composed system context.
    pub system_context: SystemContext,
    /// Tool manifest for this turn.
    pub tool_specs: Vec<ToolSpec>,
    /// Results accumulated from the previous round.
    pub tool_results: Vec<ToolResult>,
    /// Zero-based round index within the tool loop.
    pub tool_call_round: u32,
}

/// What a bridge returned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BridgeResponse {
    /// Response text (may be empty on pure tool rounds).
    pub output_text: String,
    /// One-line summary of the round's decision.
    pub decision_summary: String,
    /// Tool invocations requested for the next round; empty means terminal.
    pub tool_requests: Vec<ToolRequest>,
}

impl BridgeResponse {
    /// Whether this response ends the tool loop.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.tool_requests.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A provider bridge client. Shared and immutable after construction.
#[async_trait]
pub trait ProviderBridge: Send + Sync {
    /// Provider name this bridge serves (e.g. `"github-copilot-sdk"`).
    fn name(&self) -> &str;

    /// Run one generation round.
    async fn generate(&self, request: &BridgeRequest) -> BridgeResult<BridgeResponse>;
}

impl std::fmt::Debug for dyn ProviderBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBridge").field("name", &self.name()).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
