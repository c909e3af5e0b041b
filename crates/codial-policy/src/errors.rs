//! Policy error type.

use codial_core::errors::codes;
use thiserror::Error;

/// Errors from policy loading, rule mutation, and constraint enforcement.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Filesystem failure reading or writing a policy file.
    #[error("policy file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A rule index outside the 1-based list range.
    #[error("rule index {index} is out of range (list has {len} rules)")]
    IndexOutOfRange {
        /// Requested 1-based index.
        index: usize,
        /// Current rule count.
        len: usize,
    },

    /// The rules/agents policy forbids the request.
    #[error("{0}")]
    Violation(String),
}

impl PolicyError {
    /// Stable wire code for this error.
    #[must_use]
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Io(_) => codes::INTERNAL_ERROR,
            Self::IndexOutOfRange { .. } => codes::INDEX_OUT_OF_RANGE,
            Self::Violation(_) => codes::POLICY_VIOLATION,
        }
    }
}
