//! MCP client error type.

use codial_core::errors::codes;
use thiserror::Error;

/// Errors from MCP transport, protocol, and server responses.
#[derive(Debug, Error)]
pub enum McpError {
    /// The client is not configured (no server URL).
    #[error("MCP server URL is not configured")]
    NotConfigured,

    /// The request exceeded its deadline.
    #[error("MCP request timed out: {method}")]
    Timeout {
        /// JSON-RPC method that timed out.
        method: String,
    },

    /// Connection-level transport failure.
    #[error("MCP transport error: {0}")]
    Transport(String),

    /// The server answered with a 5xx status.
    #[error("MCP server error (status {status})")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// The server returned a JSON-RPC error object.
    #[error("MCP rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The response violated the protocol (bad shape, cursor cycle, ...).
    #[error("MCP protocol violation: {0}")]
    Protocol(String),
}

impl McpError {
    /// Stable wire code for this error.
    #[must_use]
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => codes::MCP_TIMEOUT,
            _ => codes::MCP_ERROR,
        }
    }

    /// Whether the failure is transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport(_) | Self::Server { .. })
    }

    /// Map a `reqwest` failure for `method` into an [`McpError`].
    #[must_use]
    pub fn from_reqwest(method: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                method: method.to_owned(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_mcp_timeout() {
        let err = McpError::Timeout {
            method: "tools/call".into(),
        };
        assert_eq!(err.wire_code(), "MCP_TIMEOUT");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("tools/call"));
    }

    #[test]
    fn rpc_error_not_retryable() {
        let err = McpError::Rpc {
            code: -32601,
            message: "method not found".into(),
        };
        assert_eq!(err.wire_code(), "MCP_ERROR");
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_error_retryable() {
        assert!(McpError::Server { status: 503 }.is_retryable());
    }

    #[test]
    fn protocol_and_config_not_retryable() {
        assert!(!McpError::Protocol("cursor cycle".into()).is_retryable());
        assert!(!McpError::NotConfigured.is_retryable());
    }
}
