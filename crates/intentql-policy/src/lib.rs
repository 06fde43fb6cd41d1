//! IntentQL policy enforcement.
//!
//! A policy authority decides, per request, which tables and columns may be
//! read and which predicates must always be applied (tenant scoping, soft
//! deletes...). The validator consults it to reject intents up front; the
//! compiler consults it to inject the enforced predicates.

pub mod config_policy;
pub mod error;
pub mod validator;

use intentql_core::{PredicateValue, Principal, QueryIntent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub use config_policy::ConfigPolicy;
pub use error::{ValidationError, ValidationErrorKind};
pub use validator::IntentValidator;

/// Outcome of a policy consultation for one table.
///
/// Empty collections mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyResult {
    /// Predicates that must be added to any query on the table.
    #[serde(default)]
    pub enforced_predicates: BTreeMap<String, PredicateValue>,

    /// Tables the principal may query.
    #[serde(default)]
    pub allowed_tables: Vec<String>,

    /// Readable columns per table.
    #[serde(default)]
    pub allowed_columns: HashMap<String, Vec<String>>,
}

impl PolicyResult {
    /// Whether `table` passes the table allowlist (case-insensitive).
    pub fn allows_table(&self, table: &str) -> bool {
        self.allowed_tables.is_empty()
            || self
                .allowed_tables
                .iter()
                .any(|t| t.eq_ignore_ascii_case(table))
    }

    /// The column allowlist for `table`, if the authority restricts it.
    pub fn columns_for(&self, table: &str) -> Option<&[String]> {
        self.allowed_columns
            .get(table)
            .or_else(|| {
                self.allowed_columns
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(table))
                    .map(|(_, cols)| cols)
            })
            .map(Vec::as_slice)
    }
}

/// Errors raised by a policy authority.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyError {
    /// The principal lacks an attribute the policy needs.
    #[error("principal attribute '{attribute}' required by policy is missing")]
    MissingAttribute { attribute: String },

    /// The authority could not be reached or evaluated.
    #[error("policy authority unavailable: {0}")]
    Unavailable(String),
}

/// Source of table/column allowlists and enforced predicates.
///
/// `intent` is `None` when the caller asks about a table on its own (for
/// example the related table of an `exists` filter).
pub trait PolicyAuthority: Send + Sync {
    fn apply(
        &self,
        user: Option<&Principal>,
        table: &str,
        intent: Option<&QueryIntent>,
    ) -> Result<PolicyResult, PolicyError>;
}

/// Policy authority that allows everything and enforces nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

impl PolicyAuthority for AllowAllPolicy {
    fn apply(
        &self,
        _user: Option<&Principal>,
        table: &str,
        _intent: Option<&QueryIntent>,
    ) -> Result<PolicyResult, PolicyError> {
        tracing::debug!(table, "allow-all policy consulted");
        Ok(PolicyResult::default())
    }
}
