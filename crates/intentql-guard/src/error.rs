//! Guardrail rejection types.

use std::fmt;

/// A SQL statement rejected by the linter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityError {
    pub kind: ViolationKind,
    pub message: String,
}

impl SecurityError {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    // =========================================================================
    // STATEMENT
    // =========================================================================

    pub fn statement_type(message: impl Into<String>) -> Self {
        Self::new(ViolationKind::StatementType, message)
    }

    pub fn dangerous_pattern(rule: &str) -> Self {
        Self::new(
            ViolationKind::DangerousPattern,
            format!("dangerous pattern detected: {}", rule),
        )
    }

    // =========================================================================
    // SHAPE
    // =========================================================================

    pub fn limit_violation(message: impl Into<String>) -> Self {
        Self::new(ViolationKind::LimitViolation, message)
    }

    pub fn table_not_allowed(table: &str) -> Self {
        Self::new(
            ViolationKind::AllowlistViolation,
            format!("table not allowed: '{}'", table),
        )
    }

    pub fn literal_violation(message: impl Into<String>) -> Self {
        Self::new(ViolationKind::LiteralViolation, message)
    }

    pub fn blacklisted_function(rule: &str) -> Self {
        Self::new(
            ViolationKind::FunctionBlacklist,
            format!("function not allowed: {}", rule),
        )
    }

    pub fn subquery() -> Self {
        Self::new(ViolationKind::Subquery, "subqueries are not allowed")
    }

    pub fn join_complexity(message: impl Into<String>) -> Self {
        Self::new(ViolationKind::JoinComplexity, message)
    }
}

impl fmt::Display for SecurityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation: {}", self.kind, self.message)
    }
}

impl std::error::Error for SecurityError {}

/// Category of a linter rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Not a single SELECT, or a blacklisted keyword.
    StatementType,
    /// Injection, encoding-bypass, polyglot or time-delay signature.
    DangerousPattern,
    /// Missing, non-positive or oversized LIMIT.
    LimitViolation,
    /// Table outside the caller allowlist.
    AllowlistViolation,
    /// Inline string or numeric literal.
    LiteralViolation,
    FunctionBlacklist,
    JoinComplexity,
    Subquery,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::StatementType => "statement_type",
            ViolationKind::DangerousPattern => "dangerous_pattern",
            ViolationKind::LimitViolation => "limit",
            ViolationKind::AllowlistViolation => "allowlist",
            ViolationKind::LiteralViolation => "literal",
            ViolationKind::FunctionBlacklist => "function_blacklist",
            ViolationKind::JoinComplexity => "join_complexity",
            ViolationKind::Subquery => "subquery",
        };
        f.write_str(name)
    }
}

/// A dialect contributed a pattern the regex engine rejects.
#[derive(Debug, thiserror::Error)]
#[error("invalid pattern '{name}' for dialect {dialect}: {source}")]
pub struct PatternError {
    pub dialect: String,
    pub name: &'static str,
    #[source]
    pub source: regex::Error,
}
