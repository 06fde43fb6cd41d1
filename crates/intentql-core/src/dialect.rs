//! SQL dialect profiles.
//!
//! A dialect decides placeholder syntax, identifier quoting, the EXPLAIN form
//! and plan format, and contributes extra dangerous patterns to the linter.
//! The compiler, linter and explain gate only talk to [`SqlDialect`], so a new
//! database is supported by implementing the trait.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named regular expression (case-insensitive) the linter rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternRule {
    pub name: &'static str,
    pub pattern: &'static str,
}

impl PatternRule {
    pub const fn new(name: &'static str, pattern: &'static str) -> Self {
        Self { name, pattern }
    }
}

/// Shape of the plan returned by the dialect's EXPLAIN form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    /// A JSON tree of plan nodes (`EXPLAIN (FORMAT JSON)`).
    JsonTree,
    /// Text rows, analyzed heuristically.
    Text,
}

/// Dialect profile consumed by the compiler and the guardrails.
pub trait SqlDialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Placeholder for the 1-based `index`-th bound value.
    fn placeholder(&self, index: usize) -> String;

    /// Quote an identifier. Dotted names are quoted per segment.
    fn quote_identifier(&self, name: &str) -> String;

    /// The statement that asks the database for a plan of `sql`.
    fn explain_wrapper(&self, sql: &str) -> String;

    fn plan_format(&self) -> PlanFormat;

    /// Patterns rejected by the linter in addition to the generic set.
    fn extra_dangerous_patterns(&self) -> &[PatternRule] {
        &[]
    }

    fn supports_distinct_on(&self) -> bool {
        false
    }

    /// Operator used for the `ilike` filter.
    fn case_insensitive_like(&self) -> &'static str {
        "LIKE"
    }

    /// Membership test of `target` against one placeholder bound to an array.
    fn array_membership(&self, target: &str, placeholder: &str) -> String {
        format!("{target} IN ({placeholder})")
    }
}

/// Built-in dialects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(alias = "sqlite3")]
    Sqlite,
}

const POSTGRES_PATTERNS: &[PatternRule] = &[
    PatternRule::new("pg_catalog_access", r"\bpg_catalog\b"),
    PatternRule::new("pg_settings_access", r"\b(current_setting|set_config)\s*\("),
    PatternRule::new("pg_file_access", r"\bpg_(read_file|read_binary_file|ls_dir|stat_file)\b"),
    PatternRule::new("pg_large_object", r"\blo_(import|export)\b"),
    PatternRule::new("pg_copy", r"\bcopy\s+\S+\s+(to|from)\b"),
    PatternRule::new("pg_dblink", r"\bdblink\w*\s*\("),
];

const MYSQL_PATTERNS: &[PatternRule] = &[
    PatternRule::new("mysql_system_variable", r"@@\w+"),
    PatternRule::new("mysql_versioned_comment", r"/\*!"),
    PatternRule::new("mysql_user_table", r"\bmysql\s*\.\s*user\b"),
    PatternRule::new("mysql_performance_schema", r"\bperformance_schema\b"),
    PatternRule::new("mysql_load_file", r"\bload_file\s*\("),
];

const SQLITE_PATTERNS: &[PatternRule] = &[
    PatternRule::new("sqlite_schema_access", r"\bsqlite_(master|schema|temp_master|temp_schema)\b"),
    PatternRule::new("sqlite_attach", r"\battach\s+(database\b|')"),
    PatternRule::new("sqlite_pragma", r"\bpragma\b"),
    PatternRule::new("sqlite_load_extension", r"\bload_extension\s*\("),
];

fn quote_segments(name: &str, quote: char) -> String {
    name.split('.')
        .map(|segment| {
            let escaped = segment.replace(quote, &format!("{quote}{quote}"));
            format!("{quote}{escaped}{quote}")
        })
        .collect::<Vec<_>>()
        .join(".")
}

impl SqlDialect for Dialect {
    fn name(&self) -> &str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Mysql | Dialect::Sqlite => "?".to_string(),
        }
    }

    fn quote_identifier(&self, name: &str) -> String {
        if name == "*" {
            return name.to_string();
        }
        match self {
            Dialect::Postgres | Dialect::Sqlite => quote_segments(name, '"'),
            Dialect::Mysql => quote_segments(name, '`'),
        }
    }

    fn explain_wrapper(&self, sql: &str) -> String {
        match self {
            Dialect::Postgres => format!("EXPLAIN (FORMAT JSON) {sql}"),
            Dialect::Mysql => format!("EXPLAIN {sql}"),
            Dialect::Sqlite => format!("EXPLAIN QUERY PLAN {sql}"),
        }
    }

    fn plan_format(&self) -> PlanFormat {
        match self {
            Dialect::Postgres => PlanFormat::JsonTree,
            Dialect::Mysql | Dialect::Sqlite => PlanFormat::Text,
        }
    }

    fn extra_dangerous_patterns(&self) -> &[PatternRule] {
        match self {
            Dialect::Postgres => POSTGRES_PATTERNS,
            Dialect::Mysql => MYSQL_PATTERNS,
            Dialect::Sqlite => SQLITE_PATTERNS,
        }
    }

    fn supports_distinct_on(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    fn case_insensitive_like(&self) -> &'static str {
        match self {
            Dialect::Postgres => "ILIKE",
            // MySQL's default collations and SQLite's LIKE are already case-insensitive
            Dialect::Mysql | Dialect::Sqlite => "LIKE",
        }
    }

    fn array_membership(&self, target: &str, placeholder: &str) -> String {
        match self {
            // `c IN ($1)` compares c against the whole array
            Dialect::Postgres => format!("{target} = ANY({placeholder})"),
            Dialect::Mysql | Dialect::Sqlite => format!("{target} IN ({placeholder})"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unrecognized dialect name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown SQL dialect: {0}")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(UnknownDialect(other.to_string())),
        }
    }
}
