//! Error classification and the wire error envelope.
//!
//! Every failure that crosses a process boundary — a REST response or an
//! `error` event on the stream — is rendered as an [`ErrorEnvelope`] with a
//! stable machine-readable code. Domain crates keep their own `thiserror`
//! enums; this module owns the shared vocabulary:
//!
//! - [`ErrorCategory`]: coarse classification driving retry decisions
//! - [`ErrorEnvelope`]: `{error_code, message, trace_id, retryable}`
//! - [`codes`]: the stable wire code constants
//! - [`classify_status`]: HTTP status → category

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::TraceId;

// ─────────────────────────────────────────────────────────────────────────────
// Wire codes
// ─────────────────────────────────────────────────────────────────────────────

/// Stable wire error codes.
///
/// These are contract, not type names: the gateway and operators match on
/// them, so they never change once shipped.
pub mod codes {
    /// Bearer token missing or mismatched.
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    /// Provider bridge rejected our credentials.
    pub const PROVIDER_AUTH_FAILED: &str = "PROVIDER_AUTH_FAILED";
    /// Downstream 429.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    /// Provider bridge call exceeded its deadline.
    pub const BRIDGE_TIMEOUT: &str = "BRIDGE_TIMEOUT";
    /// Provider bridge transport or protocol failure.
    pub const BRIDGE_TRANSPORT: &str = "BRIDGE_TRANSPORT";
    /// Selected provider is not in the enabled set.
    pub const PROVIDER_NOT_ENABLED: &str = "PROVIDER_NOT_ENABLED";
    /// MCP call exceeded its deadline.
    pub const MCP_TIMEOUT: &str = "MCP_TIMEOUT";
    /// MCP JSON-RPC error or transport failure.
    pub const MCP_ERROR: &str = "MCP_ERROR";
    /// Rules/agents/skills policy forbids the request.
    pub const POLICY_VIOLATION: &str = "POLICY_VIOLATION";
    /// Attachment violated the size or type limits.
    pub const ATTACHMENT_REJECTED: &str = "ATTACHMENT_REJECTED";
    /// Attachment download failed.
    pub const ATTACHMENT_FETCH_FAILED: &str = "ATTACHMENT_FETCH_FAILED";
    /// No session with the given ID.
    pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
    /// Write attempted against an ended session.
    pub const SESSION_ENDED: &str = "SESSION_ENDED";
    /// Requested subagent has no definition on disk.
    pub const SUBAGENT_NOT_FOUND: &str = "SUBAGENT_NOT_FOUND";
    /// Turn queue is saturated.
    pub const QUEUE_FULL: &str = "QUEUE_FULL";
    /// Tool loop exhausted its round budget without a terminal answer.
    pub const TOOL_BUDGET_EXCEEDED: &str = "TOOL_BUDGET_EXCEEDED";
    /// Rule index outside the 1-based list range.
    pub const INDEX_OUT_OF_RANGE: &str = "INDEX_OUT_OF_RANGE";
    /// Cooperative cancellation observed.
    pub const CANCELLED: &str = "CANCELLED";
    /// Turn abandoned during graceful shutdown.
    pub const SHUTDOWN: &str = "SHUTDOWN";
    /// Unexpected internal failure.
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

// ─────────────────────────────────────────────────────────────────────────────
// ErrorCategory
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse error classification used for retry decisions and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Credentials missing, invalid, or rejected.
    Authentication,
    /// Downstream rate limiting (429).
    RateLimit,
    /// Deadline exceeded.
    Timeout,
    /// Connection-level transport failure.
    Network,
    /// Downstream 5xx.
    Server,
    /// Caller sent something unacceptable (4xx class).
    InvalidRequest,
    /// Policy forbids the operation.
    Policy,
    /// Referenced entity does not exist.
    NotFound,
    /// Operation conflicts with current state.
    Conflict,
    /// Cooperative cancellation.
    Cancelled,
    /// Anything else.
    Unknown,
}

impl ErrorCategory {
    /// Whether errors in this category are worth retrying.
    ///
    /// Only the transient classes retry; auth, config, and policy failures
    /// fail fast.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Timeout | Self::Network | Self::Server)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Server => "server",
            Self::InvalidRequest => "invalid_request",
            Self::Policy => "policy",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classify an HTTP status code into an [`ErrorCategory`].
#[must_use]
pub fn classify_status(status: u16) -> ErrorCategory {
    match status {
        401 | 403 => ErrorCategory::Authentication,
        404 => ErrorCategory::NotFound,
        409 => ErrorCategory::Conflict,
        429 => ErrorCategory::RateLimit,
        408 => ErrorCategory::Timeout,
        s if s >= 500 => ErrorCategory::Server,
        s if (400..500).contains(&s) => ErrorCategory::InvalidRequest,
        _ => ErrorCategory::Unknown,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ErrorEnvelope
// ─────────────────────────────────────────────────────────────────────────────

/// The wire representation of a failure.
///
/// Serialized as the body of REST error responses and as the payload detail
/// of `error` stream events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Stable machine-readable code from [`codes`].
    pub error_code: String,
    /// Human-readable description.
    pub message: String,
    /// Trace ID correlating the failure with log lines.
    pub trace_id: TraceId,
    /// Whether the caller may retry the same request.
    pub retryable: bool,
}

impl ErrorEnvelope {
    /// Build an envelope with an explicit trace ID.
    #[must_use]
    pub fn new(
        error_code: impl Into<String>,
        message: impl Into<String>,
        trace_id: TraceId,
        retryable: bool,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            trace_id,
            retryable,
        }
    }

    /// Build an envelope minting a fresh trace ID.
    #[must_use]
    pub fn untraced(error_code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::new(error_code, message, TraceId::new(), retryable)
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_code, self.message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
