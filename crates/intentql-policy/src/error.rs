//! Validation error types for intent validation.
//!
//! Errors identify the offending field where there is one, and are
//! organized by the kind of violation.

use std::fmt;

/// Error type for validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The kind of validation error.
    pub kind: ValidationErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// The intent field the error refers to, if any.
    pub field: Option<String>,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
        }
    }

    /// Attach the offending field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    // =========================================================================
    // SHAPE ERRORS
    // =========================================================================

    /// Create a missing required field error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ValidationErrorKind::MissingField,
            format!("Required field '{}' is missing or empty", field),
        )
        .with_field(field)
    }

    /// Create an invalid filter error.
    pub fn invalid_filter(field: &str, reason: &str) -> Self {
        Self::new(
            ValidationErrorKind::InvalidFilter,
            format!("Invalid filter at {}: {}", field, reason),
        )
        .with_field(field)
    }

    /// Create an unsupported operator error.
    pub fn unsupported_operator(field: &str, op: &str) -> Self {
        Self::new(
            ValidationErrorKind::UnsupportedOperator,
            format!("Unsupported operator '{}' at {}", op, field),
        )
        .with_field(field)
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(field: &str, identifier: &str) -> Self {
        Self::new(
            ValidationErrorKind::InvalidIdentifier,
            format!("'{}' at {} is not a valid identifier", identifier, field),
        )
        .with_field(field)
    }

    // =========================================================================
    // LIMIT ERRORS
    // =========================================================================

    /// Create a non-positive limit error.
    pub fn invalid_limit(limit: i64) -> Self {
        Self::new(
            ValidationErrorKind::InvalidLimit,
            format!("Limit must be positive, got {}", limit),
        )
        .with_field("limit")
    }

    /// Create a limit exceeded error.
    pub fn limit_exceeded(limit: i64, max: u64) -> Self {
        Self::new(
            ValidationErrorKind::LimitExceeded,
            format!("Requested limit {} exceeds max_limit {}", limit, max),
        )
        .with_field("limit")
    }

    // =========================================================================
    // ALLOWLIST ERRORS
    // =========================================================================

    /// Create a table not allowed error.
    pub fn table_not_allowed(table: &str) -> Self {
        Self::new(
            ValidationErrorKind::TableNotAllowed,
            format!("table not allowed: '{}'", table),
        )
        .with_field("table")
    }

    /// Create a column not permitted error.
    pub fn column_not_allowed(table: &str, column: &str) -> Self {
        Self::new(
            ValidationErrorKind::ColumnNotAllowed,
            format!(
                "Column '{}' is not permitted on table '{}'",
                column, table
            ),
        )
        .with_field(column)
    }

    /// Create a policy unavailable error.
    pub fn policy_unavailable(table: &str, reason: &str) -> Self {
        Self::new(
            ValidationErrorKind::PolicyUnavailable,
            format!("Policy check for table '{}' failed: {}", table, reason),
        )
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Categories of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    // =========================================================================
    // Shape errors
    // =========================================================================
    /// A required field is missing or empty.
    MissingField,
    /// A filter is structurally invalid.
    InvalidFilter,
    /// A filter uses an operator outside the supported set.
    UnsupportedOperator,
    /// A table or column name contains characters outside the identifier set.
    InvalidIdentifier,

    // =========================================================================
    // Limit errors
    // =========================================================================
    /// Limit is zero or negative.
    InvalidLimit,
    /// Limit exceeds the configured maximum.
    LimitExceeded,

    // =========================================================================
    // Allowlist errors
    // =========================================================================
    /// Table is not in the caller or policy allowlist.
    TableNotAllowed,
    /// Column is not in the policy's column allowlist.
    ColumnNotAllowed,
    /// The policy authority failed.
    PolicyUnavailable,
}
