//! `intentql lint`: run the SQL linter over a statement.

use super::Report;
use anyhow::Result;
use intentql_core::{IntentqlConfig, SqlDialect};
use intentql_guard::SqlLinter;
use serde_json::json;
use std::sync::Arc;

pub fn run(config: &IntentqlConfig, sql: &str, allow_tables: &[String]) -> Result<Report> {
    let dialect: Arc<dyn SqlDialect> = Arc::new(config.dialect);
    let linter = SqlLinter::new(dialect, config.guardrails.clone())?;

    Ok(match linter.check(sql, allow_tables) {
        Ok(()) => Report::accepted(json!({ "ok": true })),
        Err(e) => Report::rejected(json!({
            "ok": false,
            "stage": "lint",
            "kind": e.kind.to_string(),
            "error": e.message,
        })),
    })
}
