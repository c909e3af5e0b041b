//! Runtime error type.
//!
//! Aggregates the domain errors of the crates below it and adds the
//! orchestration failures (queue saturation, tool budget, cancellation).
//! Every variant maps to a stable wire code and a retryability flag so the
//! REST layer and the event stream can render a uniform envelope.

use codial_bridge::BridgeError;
use codial_core::errors::{codes, ErrorEnvelope};
use codial_core::ids::TraceId;
use codial_mcp::McpError;
use codial_policy::PolicyError;
use thiserror::Error;

/// Wire code for a whole-turn deadline.
pub const TURN_TIMEOUT_CODE: &str = "TURN_TIMEOUT";

/// Errors surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No session with the given ID.
    #[error("session `{0}` was not found")]
    SessionNotFound(String),

    /// Write or turn submission against an ended session.
    #[error("session `{0}` has ended")]
    SessionEnded(String),

    /// Requested subagent has no definition on disk.
    #[error("subagent `{0}` was not found")]
    SubagentNotFound(String),

    /// Turn queue is saturated.
    #[error("turn queue is full")]
    QueueFull,

    /// Tool loop exhausted its round budget.
    #[error("tool budget exhausted after {rounds} rounds")]
    ToolBudgetExceeded {
        /// Rounds executed.
        rounds: u32,
    },

    /// The whole-turn wall-clock budget expired.
    #[error("turn exceeded its {seconds}s budget")]
    TurnTimeout {
        /// Budget in seconds.
        seconds: u64,
    },

    /// Cooperative cancellation observed.
    #[error("turn was cancelled")]
    Cancelled,

    /// Turn abandoned during graceful shutdown.
    #[error("turn abandoned during shutdown")]
    Shutdown,

    /// Attachment violated the size or type limits.
    #[error("attachment rejected: {0}")]
    AttachmentRejected(String),

    /// Attachment download failure.
    #[error("attachment fetch failed: {0}")]
    AttachmentFetch(String),

    /// Policy loading or enforcement failure.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Provider bridge failure.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// MCP failure.
    #[error(transparent)]
    Mcp(#[from] McpError),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Stable wire code for this error.
    #[must_use]
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => codes::SESSION_NOT_FOUND,
            Self::SessionEnded(_) => codes::SESSION_ENDED,
            Self::SubagentNotFound(_) => codes::SUBAGENT_NOT_FOUND,
            Self::QueueFull => codes::QUEUE_FULL,
            Self::ToolBudgetExceeded { .. } => codes::TOOL_BUDGET_EXCEEDED,
            Self::TurnTimeout { .. } => TURN_TIMEOUT_CODE,
            Self::Cancelled => codes::CANCELLED,
            Self::Shutdown => codes::SHUTDOWN,
            Self::AttachmentRejected(_) => codes::ATTACHMENT_REJECTED,
            Self::AttachmentFetch(_) => codes::ATTACHMENT_FETCH_FAILED,
            Self::Policy(e) => e.wire_code(),
            Self::Bridge(e) => e.wire_code(),
            Self::Mcp(e) => e.wire_code(),
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Whether the caller may retry the same request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::QueueFull | Self::TurnTimeout { .. } => true,
            Self::Bridge(e) => e.is_retryable(),
            Self::Mcp(e) => e.is_retryable(),
            Self::AttachmentFetch(_) => true,
            _ => false,
        }
    }

    /// Render as a wire envelope carrying `trace_id`.
    #[must_use]
    pub fn to_envelope(&self, trace_id: TraceId) -> ErrorEnvelope {
        ErrorEnvelope::new(self.wire_code(), self.to_string(), trace_id, self.is_retryable())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
