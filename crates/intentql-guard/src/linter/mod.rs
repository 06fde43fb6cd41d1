//! Lexical SQL linter.
//!
//! `SqlLinter::check` runs these checks in order and stops at the first
//! violation:
//!
//! 1. **Statement type** - a single SELECT, no blacklisted keywords
//! 2. **Dangerous patterns** - injection signatures, dialect extras, then
//!    encoding bypass, polyglot and time-delay signatures
//! 3. **LIMIT policy** - per query shape
//! 4. **Table allowlist** - FROM/JOIN targets
//! 5. **Literals** - inline strings and multi-digit numbers in WHERE
//! 6. **Function blacklist**
//! 7. **Subqueries** - only when `block_subqueries` is set
//! 8. **JOIN complexity**
//!
//! The linter scans text. It is not a parser, and input it cannot make
//! sense of falls through to the next check instead of failing.

mod patterns;
mod scan;

use crate::error::{PatternError, SecurityError};
use intentql_core::{GuardrailsConfig, SqlDialect};
use patterns::{Rule, first_match};
use scan::LimitClause;
use std::sync::Arc;

/// Lexical guardrail applied to SQL text before execution.
#[derive(Debug, Clone)]
pub struct SqlLinter {
    guardrails: GuardrailsConfig,
    dialect_name: String,
    dialect_rules: Vec<Rule>,
}

impl SqlLinter {
    /// Create a linter for `dialect`, compiling its extra dangerous patterns.
    pub fn new(
        dialect: Arc<dyn SqlDialect>,
        guardrails: GuardrailsConfig,
    ) -> Result<Self, PatternError> {
        let dialect_rules = dialect
            .extra_dangerous_patterns()
            .iter()
            .map(|rule| {
                patterns::compile(rule).map_err(|source| PatternError {
                    dialect: dialect.name().to_string(),
                    name: rule.name,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            guardrails,
            dialect_name: dialect.name().to_string(),
            dialect_rules,
        })
    }

    /// Check `sql`. An empty `allow_tables` skips the table allowlist.
    pub fn check(&self, sql: &str, allow_tables: &[String]) -> Result<(), SecurityError> {
        let masked = scan::mask(sql);

        let result = self
            .check_statement(sql)
            .and_then(|_| self.check_patterns(sql))
            .and_then(|_| self.check_limit(&masked))
            .and_then(|_| check_tables(sql, allow_tables))
            .and_then(|_| check_literals(sql, &masked))
            .and_then(|_| check_functions(sql))
            .and_then(|_| self.check_subqueries(&masked))
            .and_then(|_| self.check_joins(&masked));

        if let Err(e) = &result {
            tracing::info!(
                dialect = %self.dialect_name,
                kind = %e.kind,
                reason = %e.message,
                "SQL rejected by linter"
            );
        }
        result
    }

    fn check_statement(&self, sql: &str) -> Result<(), SecurityError> {
        if !patterns::SELECT_PREFIX.is_match(sql) {
            return Err(SecurityError::statement_type("only SELECT statements are allowed"));
        }
        if sql.contains(';') {
            return Err(SecurityError::statement_type("multiple statements are not allowed"));
        }
        if let Some(keyword) = patterns::FORBIDDEN_KEYWORD.find(sql) {
            return Err(SecurityError::statement_type(format!(
                "keyword not allowed: {}",
                keyword.as_str().to_ascii_uppercase()
            )));
        }
        Ok(())
    }

    fn check_patterns(&self, sql: &str) -> Result<(), SecurityError> {
        let hit = first_match(&patterns::DANGEROUS, sql)
            .or_else(|| first_match(&self.dialect_rules, sql))
            .or_else(|| first_match(&patterns::EVASION, sql));
        match hit {
            Some(rule) => Err(SecurityError::dangerous_pattern(rule.name)),
            None => Ok(()),
        }
    }

    fn check_limit(&self, masked: &str) -> Result<(), SecurityError> {
        let g = &self.guardrails;

        // (shape, ceiling, LIMIT required)
        let (shape, ceiling, required) = if patterns::COUNT_CALL.is_match(masked) {
            ("count", g.count_limit, false)
        } else if patterns::AGGREGATE_CALL.is_match(masked) {
            ("aggregation", g.aggregation_limit, g.aggregation_limit.is_some())
        } else if patterns::EXISTS_CALL.is_match(masked) {
            ("exists", None, false)
        } else if patterns::SELECT_DISTINCT.is_match(masked) {
            ("distinct", g.distinct_limit, g.distinct_limit.is_some())
        } else {
            ("select", None, g.require_limit_by_default)
        };

        match scan::limit_clause(masked) {
            LimitClause::Absent if required => Err(SecurityError::limit_violation(format!(
                "{} queries require a LIMIT",
                shape
            ))),
            LimitClause::Absent | LimitClause::Bound => Ok(()),
            LimitClause::Value(limit) if limit <= 0 => Err(SecurityError::limit_violation(
                format!("LIMIT must be positive, got {}", limit),
            )),
            LimitClause::Value(limit) if limit as u64 > g.max_limit => {
                Err(SecurityError::limit_violation(format!(
                    "LIMIT {} exceeds max_limit {}",
                    limit, g.max_limit
                )))
            }
            LimitClause::Value(limit) => match ceiling {
                Some(ceiling) if limit as u64 > ceiling => {
                    Err(SecurityError::limit_violation(format!(
                        "LIMIT {} exceeds the {} ceiling {}",
                        limit, shape, ceiling
                    )))
                }
                _ => Ok(()),
            },
        }
    }

    fn check_subqueries(&self, masked: &str) -> Result<(), SecurityError> {
        if self.guardrails.block_subqueries && patterns::SUBQUERY.is_match(masked) {
            return Err(SecurityError::subquery());
        }
        Ok(())
    }

    fn check_joins(&self, masked: &str) -> Result<(), SecurityError> {
        let joins = patterns::JOIN.find_iter(masked).count();
        if joins > self.guardrails.max_joins {
            return Err(SecurityError::join_complexity(format!(
                "{} joins exceed max_joins {}",
                joins, self.guardrails.max_joins
            )));
        }
        let on_clauses = patterns::ON
            .find_iter(masked)
            .count()
            .saturating_sub(patterns::DISTINCT_ON.find_iter(masked).count());
        if joins > 0 && on_clauses == 0 {
            return Err(SecurityError::join_complexity("JOIN without an ON clause"));
        }
        Ok(())
    }
}

fn check_tables(sql: &str, allow_tables: &[String]) -> Result<(), SecurityError> {
    if allow_tables.is_empty() {
        return Ok(());
    }
    for table in scan::referenced_tables(sql) {
        let bare = table.rsplit('.').next().unwrap_or(&table);
        let allowed = allow_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&table) || t.eq_ignore_ascii_case(bare));
        if !allowed {
            return Err(SecurityError::table_not_allowed(&table));
        }
    }
    Ok(())
}

fn check_literals(sql: &str, masked: &str) -> Result<(), SecurityError> {
    if let Some(literal) = scan::disallowed_string_literal(sql) {
        return Err(SecurityError::literal_violation(format!(
            "string literal not allowed: {}",
            literal
        )));
    }
    if let Some(number) = scan::where_numeric_literal(masked) {
        return Err(SecurityError::literal_violation(format!(
            "numeric literal {} in WHERE must be a parameter",
            number
        )));
    }
    Ok(())
}

fn check_functions(sql: &str) -> Result<(), SecurityError> {
    match first_match(&patterns::BLACKLISTED_FUNCTIONS, sql) {
        Some(rule) => Err(SecurityError::blacklisted_function(rule.name)),
        None => Ok(()),
    }
}
