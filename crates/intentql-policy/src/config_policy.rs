//! Policy authority backed by the static `policy` configuration section.

use crate::{PolicyAuthority, PolicyError, PolicyResult};
use intentql_core::{PolicyConfig, PredicateValue, Principal, QueryIntent};
use std::collections::HashMap;

/// Serves allowlists and enforced predicates from [`PolicyConfig`].
///
/// - `allowed_tables` is the set of configured tables (empty = unrestricted)
/// - `allowed_columns` carries the requested table's column list, if any
/// - `enforced_predicates` merges the table's literal predicates with the
///   tenant predicate, whose value comes from the principal's attributes
#[derive(Debug, Clone)]
pub struct ConfigPolicy {
    config: PolicyConfig,
}

impl ConfigPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }
}

impl PolicyAuthority for ConfigPolicy {
    fn apply(
        &self,
        user: Option<&Principal>,
        table: &str,
        _intent: Option<&QueryIntent>,
    ) -> Result<PolicyResult, PolicyError> {
        let mut allowed_tables: Vec<String> = self.config.tables.keys().cloned().collect();
        allowed_tables.sort();

        let mut result = PolicyResult {
            allowed_tables,
            ..Default::default()
        };

        if let Some(table_policy) = self.config.table(table) {
            if let Some(columns) = &table_policy.columns {
                result.allowed_columns =
                    HashMap::from([(table.to_string(), columns.clone())]);
            }
            result.enforced_predicates = table_policy.predicates.clone();
        }

        if let Some(tenant) = &self.config.tenant
            && let Some(column) = tenant.column_for(table)
        {
            let value = user
                .and_then(|u| u.attrs.get(&tenant.attribute))
                .filter(|v| !v.is_null())
                .cloned()
                .ok_or_else(|| PolicyError::MissingAttribute {
                    attribute: tenant.attribute.clone(),
                })?;
            result
                .enforced_predicates
                .insert(column.to_string(), PredicateValue::Scalar(value));
        }

        tracing::debug!(
            table,
            predicates = result.enforced_predicates.len(),
            "config policy applied"
        );

        Ok(result)
    }
}
