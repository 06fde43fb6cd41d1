//! Explain gate configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds for plan-based blocking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainConfig {
    /// Whether the pipeline consults the explain gate at all.
    #[serde(default)]
    pub enabled: bool,

    /// Highest total cost any plan node may report.
    #[serde(default = "default_max_query_cost")]
    pub max_query_cost: f64,

    /// Highest row estimate any plan node may report.
    #[serde(default = "default_max_query_rows")]
    pub max_query_rows: u64,

    /// Allow sequential / full table scans regardless of size.
    #[serde(default)]
    pub allow_seq_scans: bool,

    /// Row estimate above which a sequential scan is rejected.
    #[serde(default = "default_seq_scan_row_threshold")]
    pub seq_scan_row_threshold: u64,

    /// Row estimate above which a nested loop is rejected.
    #[serde(default = "default_nested_loop_row_threshold")]
    pub nested_loop_row_threshold: u64,

    /// Decision returned when the plan cannot be obtained or analyzed.
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,

    /// Budget for one plan round trip, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Plans nested deeper than this are treated as malformed.
    #[serde(default = "default_max_plan_depth")]
    pub max_plan_depth: usize,
}

impl ExplainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_query_cost: default_max_query_cost(),
            max_query_rows: default_max_query_rows(),
            allow_seq_scans: false,
            seq_scan_row_threshold: default_seq_scan_row_threshold(),
            nested_loop_row_threshold: default_nested_loop_row_threshold(),
            fail_open: default_fail_open(),
            timeout_ms: default_timeout_ms(),
            max_plan_depth: default_max_plan_depth(),
        }
    }
}

fn default_max_query_cost() -> f64 {
    10_000.0
}

fn default_max_query_rows() -> u64 {
    1_000_000
}

fn default_seq_scan_row_threshold() -> u64 {
    10_000
}

fn default_nested_loop_row_threshold() -> u64 {
    100_000
}

fn default_fail_open() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_plan_depth() -> usize {
    256
}
