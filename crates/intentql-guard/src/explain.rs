//! Cost-based explain gate.
//!
//! Asks a [`PlanProvider`] for the plan of a compiled query and rejects it
//! when the estimates cross the configured thresholds. The gate never
//! returns an error: a provider failure, a timeout or a plan it cannot read
//! resolves to `fail_open`.

use async_trait::async_trait;
use intentql_core::{BindSpecEntry, CompiledQuery, ExplainConfig, PlanFormat, SqlDialect};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// What the provider is asked to explain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRequest {
    /// The dialect's EXPLAIN statement wrapping `sql`.
    pub statement: String,
    /// The compiled query itself.
    pub sql: String,
    /// Bound values in placeholder order.
    pub params: Vec<Value>,
    /// Column and cast behind each placeholder, parallel to `params`.
    pub bind_spec: Vec<BindSpecEntry>,
    #[serde(skip)]
    pub format: PlanFormat,
}

/// A plan as returned by the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryPlan {
    /// Structured plan tree (`EXPLAIN (FORMAT JSON)`).
    Json(Value),
    /// One entry per plan output row.
    Text(Vec<String>),
}

/// Source of query plans, usually a database connection.
#[async_trait]
pub trait PlanProvider: Send + Sync {
    async fn explain(&self, request: &PlanRequest) -> anyhow::Result<QueryPlan>;
}

/// Why a plan was rejected, or why it could not be judged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("plan cost {cost} exceeds max_query_cost {max}")]
    CostExceeded { cost: f64, max: f64 },

    #[error("plan estimates {rows} rows, above max_query_rows {max}")]
    RowsExceeded { rows: u64, max: u64 },

    #[error("sequential scan on {relation} estimates {rows} rows")]
    SequentialScan { relation: String, rows: u64 },

    #[error("nested loop estimates {rows} rows")]
    NestedLoop { rows: u64 },

    #[error("plan step rejected: {0}")]
    TextHeuristic(String),

    /// The plan could not be interpreted. Resolved by `fail_open`.
    #[error("malformed plan: {0}")]
    Malformed(String),
}

impl PlanError {
    /// Whether this is a threshold rejection rather than an unreadable plan.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, PlanError::Malformed(_))
    }
}

/// Plan-based guardrail.
#[derive(Clone)]
pub struct ExplainGate {
    dialect: Arc<dyn SqlDialect>,
    config: ExplainConfig,
    provider: Arc<dyn PlanProvider>,
}

impl ExplainGate {
    pub fn new(
        dialect: Arc<dyn SqlDialect>,
        config: ExplainConfig,
        provider: Arc<dyn PlanProvider>,
    ) -> Self {
        Self {
            dialect,
            config,
            provider,
        }
    }

    /// Decide whether `query` may run, within the configured timeout.
    pub async fn allowed(&self, query: &CompiledQuery) -> bool {
        self.allowed_within(query, self.config.timeout()).await
    }

    /// Decide whether `query` may run, waiting at most `timeout` for the plan.
    pub async fn allowed_within(&self, query: &CompiledQuery, timeout: Duration) -> bool {
        if !self.config.enabled {
            tracing::debug!("explain gate disabled");
            return true;
        }

        let request = PlanRequest {
            statement: self.dialect.explain_wrapper(&query.sql),
            sql: query.sql.clone(),
            params: query.bound_values(),
            bind_spec: query.bind_spec.clone(),
            format: self.dialect.plan_format(),
        };

        let plan = match tokio::time::timeout(timeout, self.provider.explain(&request)).await {
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => return self.fail(&format!("plan provider failed: {e:#}")),
            Err(_) => {
                return self.fail(&format!("plan provider timed out after {timeout:?}"));
            }
        };

        match self.analyze(&plan) {
            Ok(()) => true,
            Err(e) if e.is_rejection() => {
                tracing::info!(reason = %e, sql = %query.sql, "query blocked by explain gate");
                false
            }
            Err(e) => self.fail(&e.to_string()),
        }
    }

    /// Check a plan against the thresholds.
    pub fn analyze(&self, plan: &QueryPlan) -> Result<(), PlanError> {
        match plan {
            QueryPlan::Json(value) => self.analyze_tree(value),
            QueryPlan::Text(lines) => self.analyze_text(lines),
        }
    }

    fn fail(&self, reason: &str) -> bool {
        tracing::warn!(
            reason,
            fail_open = self.config.fail_open,
            "explain gate could not judge the query"
        );
        self.config.fail_open
    }

    /// Walk a JSON plan tree with an explicit stack.
    fn analyze_tree(&self, plan: &Value) -> Result<(), PlanError> {
        let root = plan_root(plan)
            .ok_or_else(|| PlanError::Malformed("no plan node at the root".to_string()))?;

        let mut stack: Vec<(&Value, usize)> = vec![(root, 1)];
        while let Some((node, depth)) = stack.pop() {
            if depth > self.config.max_plan_depth {
                return Err(PlanError::Malformed(format!(
                    "plan deeper than {} levels",
                    self.config.max_plan_depth
                )));
            }
            let Some(fields) = node.as_object() else {
                return Err(PlanError::Malformed("plan node is not an object".to_string()));
            };

            self.check_node(node)?;

            match fields.get("Plans") {
                None => {}
                Some(Value::Array(children)) => {
                    stack.extend(children.iter().map(|child| (child, depth + 1)));
                }
                Some(_) => {
                    return Err(PlanError::Malformed("\"Plans\" is not an array".to_string()));
                }
            }
        }
        Ok(())
    }

    fn check_node(&self, node: &Value) -> Result<(), PlanError> {
        let cost = node.get("Total Cost").and_then(Value::as_f64).unwrap_or(0.0);
        if cost > self.config.max_query_cost {
            return Err(PlanError::CostExceeded {
                cost,
                max: self.config.max_query_cost,
            });
        }

        let rows = node
            .get("Plan Rows")
            .and_then(Value::as_f64)
            .map(|r| r.max(0.0) as u64)
            .unwrap_or(0);
        if rows > self.config.max_query_rows {
            return Err(PlanError::RowsExceeded {
                rows,
                max: self.config.max_query_rows,
            });
        }

        match node.get("Node Type").and_then(Value::as_str) {
            Some("Seq Scan")
                if !self.config.allow_seq_scans && rows > self.config.seq_scan_row_threshold =>
            {
                let relation = node
                    .get("Relation Name")
                    .and_then(Value::as_str)
                    .unwrap_or("<unknown>")
                    .to_string();
                Err(PlanError::SequentialScan { relation, rows })
            }
            Some("Nested Loop") if rows > self.config.nested_loop_row_threshold => {
                Err(PlanError::NestedLoop { rows })
            }
            _ => Ok(()),
        }
    }

    fn analyze_text(&self, lines: &[String]) -> Result<(), PlanError> {
        if lines.is_empty() {
            return Err(PlanError::Malformed("empty text plan".to_string()));
        }

        for line in lines {
            let rows = row_estimate(line);
            if let Some(rows) = rows
                && rows > self.config.max_query_rows
            {
                return Err(PlanError::RowsExceeded {
                    rows,
                    max: self.config.max_query_rows,
                });
            }

            let over_scan_threshold = rows.is_none_or(|r| r > self.config.seq_scan_row_threshold);
            if !self.config.allow_seq_scans && FULL_SCAN.is_match(line) && over_scan_threshold {
                return Err(PlanError::TextHeuristic(format!("full scan: {}", line.trim())));
            }

            if EXPENSIVE_SORT.is_match(line)
                && rows.is_some_and(|r| r > self.config.seq_scan_row_threshold)
            {
                return Err(PlanError::TextHeuristic(format!(
                    "sort over large input: {}",
                    line.trim()
                )));
            }
        }
        Ok(())
    }
}

/// The top plan node of `EXPLAIN (FORMAT JSON)` output, accepting
/// `[{"Plan": ..}]`, `{"Plan": ..}` or a bare node.
fn plan_root(plan: &Value) -> Option<&Value> {
    let top = match plan {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match top.get("Plan") {
        Some(node) => Some(node),
        None if top.get("Node Type").is_some() => Some(top),
        None => None,
    }
}

/// Full table scans: SQLite `SCAN t` without an index, MySQL access type `ALL`.
static FULL_SCAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:[|`\-\s]*)?scan\s+(?:table\s+)?\w+\s*$|\btype:?\s*all\b|\bfull\s+(?:table\s+)?scan\b")
        .expect("valid regex")
});

static EXPENSIVE_SORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)using\s+filesort|using\s+temporary|temp\s+b-tree").expect("valid regex")
});

static ROWS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\brows\s*[=:]?\s*(\d+)|\b(\d+)\s+rows\b").expect("valid regex")
});

fn row_estimate(line: &str) -> Option<u64> {
    ROWS.captures_iter(line)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .max()
}
