//! Configuration types for IntentQL.
//!
//! Every component receives its slice of this configuration through its
//! constructor; there is no process-wide configuration singleton.
//! Configuration is usually loaded from an `intentql.yaml` file.
//!
//! # Sections
//!
//! - **dialect**: target database (`postgres`, `mysql`, `sqlite`)
//! - **guardrails**: limit ceilings, join and subquery rules for the compiler and linter
//! - **explain**: cost thresholds and failure polarity for the explain gate
//! - **cache**: capacities and TTLs of the intent and query-result caches
//! - **policy**: the static policy authority (tenant scoping, column allowlists)

pub mod cache;
pub mod explain;
pub mod policy;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::dialect::Dialect;

pub use cache::{CacheConfig, CacheSettings};
pub use explain::ExplainConfig;
pub use policy::{PolicyConfig, PredicateValue, TablePolicy, TenantScope};

/// Complete IntentQL configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentqlConfig {
    /// Target SQL dialect.
    #[serde(default)]
    pub dialect: Dialect,

    /// Compiler and linter guardrails.
    #[serde(default)]
    pub guardrails: GuardrailsConfig,

    /// Explain gate settings.
    #[serde(default)]
    pub explain: ExplainConfig,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Static policy authority.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Limit ceilings and structural rules shared by the validator, compiler and linter.
///
/// Per-type ceilings are `Option`s: `None` (YAML `~`) means unlimited, in which
/// case the compiler emits no LIMIT and the linter does not require one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    /// Limit applied when an intent does not request one.
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Largest LIMIT any statement may carry.
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,

    /// Maximum number of JOINs in a statement.
    #[serde(default = "default_max_joins")]
    pub max_joins: usize,

    /// Reject any `(SELECT` subquery.
    #[serde(default)]
    pub block_subqueries: bool,

    /// Require a LIMIT on plain (non-aggregate, non-distinct) selects.
    #[serde(default)]
    pub require_limit_by_default: bool,

    /// Ceiling for COUNT queries. Unlimited by default.
    #[serde(default)]
    pub count_limit: Option<u64>,

    /// Ceiling for SUM/AVG/MAX/MIN queries.
    #[serde(default = "default_aggregation_limit")]
    pub aggregation_limit: Option<u64>,

    /// Ceiling for DISTINCT queries.
    #[serde(default = "default_distinct_limit")]
    pub distinct_limit: Option<u64>,

    /// Ceiling for queries with EXISTS / NOT EXISTS filters.
    #[serde(default = "default_exists_limit")]
    pub exists_limit: u64,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            max_joins: default_max_joins(),
            block_subqueries: false,
            require_limit_by_default: false,
            count_limit: None,
            aggregation_limit: default_aggregation_limit(),
            distinct_limit: default_distinct_limit(),
            exists_limit: default_exists_limit(),
        }
    }
}

// Default value functions
fn default_limit() -> u64 {
    100
}

fn default_max_limit() -> u64 {
    10_000
}

fn default_max_joins() -> usize {
    3
}

fn default_aggregation_limit() -> Option<u64> {
    Some(1_000)
}

fn default_distinct_limit() -> Option<u64> {
    Some(1_000)
}

fn default_exists_limit() -> u64 {
    200
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntentqlConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content and check it for consistency.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that contradict each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.guardrails;
        if g.max_limit == 0 {
            return Err(ConfigError::Config("max_limit must be positive".into()));
        }
        if g.default_limit == 0 || g.default_limit > g.max_limit {
            return Err(ConfigError::Config(format!(
                "default_limit {} must be between 1 and max_limit {}",
                g.default_limit, g.max_limit
            )));
        }
        let ceilings = [
            ("count_limit", g.count_limit),
            ("aggregation_limit", g.aggregation_limit),
            ("distinct_limit", g.distinct_limit),
            ("exists_limit", Some(g.exists_limit)),
        ];
        for (name, ceiling) in ceilings {
            if let Some(value) = ceiling
                && (value == 0 || value > g.max_limit)
            {
                return Err(ConfigError::Config(format!(
                    "{} {} must be between 1 and max_limit {}",
                    name, value, g.max_limit
                )));
            }
        }
        if self.explain.max_plan_depth == 0 {
            return Err(ConfigError::Config("explain.max_plan_depth must be positive".into()));
        }
        for (name, settings) in [("intent", &self.cache.intent), ("result", &self.cache.result)] {
            if settings.capacity == 0 {
                return Err(ConfigError::Config(format!(
                    "cache.{} capacity must be positive",
                    name
                )));
            }
        }
        Ok(())
    }
}
