//! Placeholder bookkeeping for a single statement.

use intentql_core::{BindCast, BindSpecEntry, CompiledQuery, SqlDialect};
use serde_json::Value;
use std::collections::BTreeMap;

/// Accumulates bound parameters while a statement is rendered.
///
/// One counter covers the whole statement, subqueries included, so
/// placeholders are numbered in the order their fragments are emitted.
pub(crate) struct StatementBuilder<'d> {
    dialect: &'d dyn SqlDialect,
    params: BTreeMap<String, Value>,
    bind_spec: Vec<BindSpecEntry>,
}

impl<'d> StatementBuilder<'d> {
    pub(crate) fn new(dialect: &'d dyn SqlDialect, params: BTreeMap<String, Value>) -> Self {
        Self {
            dialect,
            params,
            bind_spec: Vec::new(),
        }
    }

    /// Register the next placeholder for `key`, compared to `column` of
    /// `table`, and return its SQL text.
    pub(crate) fn bind(
        &mut self,
        key: &str,
        table: &str,
        column: &str,
        cast: Option<BindCast>,
    ) -> String {
        // a qualified column names its own table
        let (table, column) = column.rsplit_once('.').unwrap_or((table, column));
        self.bind_spec.push(BindSpecEntry {
            key: key.to_string(),
            column: column.to_string(),
            table: table.to_string(),
            cast,
        });
        self.dialect.placeholder(self.bind_spec.len())
    }

    /// Add or replace a parameter value.
    pub(crate) fn set_param(&mut self, key: String, value: Value) {
        self.params.insert(key, value);
    }

    pub(crate) fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    /// `"table"."column"`, unless the column is already qualified.
    pub(crate) fn qualified(&self, table: &str, column: &str) -> String {
        if column.contains('.') {
            self.quote(column)
        } else {
            format!("{}.{}", self.quote(table), self.quote(column))
        }
    }

    pub(crate) fn dialect(&self) -> &dyn SqlDialect {
        self.dialect
    }

    pub(crate) fn finish(self, sql: String) -> CompiledQuery {
        CompiledQuery {
            sql,
            params: self.params,
            bind_spec: self.bind_spec,
        }
    }
}
