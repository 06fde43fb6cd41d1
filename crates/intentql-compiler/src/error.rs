//! Error types for the compiler crate.

use thiserror::Error;

/// Errors that can occur while compiling an intent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Filter operator outside the supported set.
    #[error("unsupported operator '{op}' on column '{column}'")]
    UnsupportedOperator { op: String, column: String },

    /// Filter is structurally incomplete.
    #[error("malformed {op} filter: {reason}")]
    MalformedFilter { op: String, reason: String },

    /// The intent asks for something the dialect or projection rules cannot express.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// Explicit limit is zero or negative.
    #[error("limit must be positive, got {0}")]
    InvalidLimit(i64),
}

impl CompileError {
    pub(crate) fn malformed(op: &str, reason: impl Into<String>) -> Self {
        Self::MalformedFilter {
            op: op.to_string(),
            reason: reason.into(),
        }
    }
}
