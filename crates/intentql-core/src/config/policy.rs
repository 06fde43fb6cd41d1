//! Static policy configuration.
//!
//! Describes the built-in policy authority: which tables and columns may be
//! queried, which predicates are always enforced, and how rows are scoped to
//! the requesting principal's tenant.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// A predicate value enforced on a column: either one value (`=`) or an
/// inclusive range (`BETWEEN`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateValue {
    Range { start: Value, end: Value },
    Scalar(Value),
}

/// Static policy settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Tenant scoping applied to every non-global table.
    #[serde(default)]
    pub tenant: Option<TenantScope>,

    /// Per-table rules. When non-empty, only these tables may be queried.
    #[serde(default)]
    pub tables: HashMap<String, TablePolicy>,
}

/// How rows are scoped to the principal's tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantScope {
    /// Column holding the tenant identifier.
    #[serde(default = "default_tenant_column")]
    pub column: String,

    /// Principal attribute supplying the tenant identifier.
    #[serde(default = "default_tenant_attribute")]
    pub attribute: String,

    /// Tables that are global (no tenant scoping applied).
    #[serde(default)]
    pub global_tables: Vec<String>,
}

impl Default for TenantScope {
    fn default() -> Self {
        Self {
            column: default_tenant_column(),
            attribute: default_tenant_attribute(),
            global_tables: Vec::new(),
        }
    }
}

impl TenantScope {
    /// Tenant column for a table, or `None` when the table is global.
    pub fn column_for(&self, table: &str) -> Option<&str> {
        if self
            .global_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
        {
            return None;
        }
        Some(&self.column)
    }
}

/// Rules for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePolicy {
    /// Columns that may be referenced. `None` allows every column.
    #[serde(default)]
    pub columns: Option<Vec<String>>,

    /// Predicates always enforced on this table.
    #[serde(default)]
    pub predicates: BTreeMap<String, PredicateValue>,
}

impl PolicyConfig {
    /// Look up the rules for a table, case-insensitively.
    pub fn table(&self, table: &str) -> Option<&TablePolicy> {
        self.tables.get(table).or_else(|| {
            self.tables
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(table))
                .map(|(_, policy)| policy)
        })
    }
}

fn default_tenant_column() -> String {
    "tenant_id".to_string()
}

fn default_tenant_attribute() -> String {
    "tenant_id".to_string()
}
