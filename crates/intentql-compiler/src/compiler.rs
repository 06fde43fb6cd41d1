//! Intent compiler.
//!
//! Renders a validated [`QueryIntent`] as one parameterized SELECT:
//!
//! ```text
//! SELECT [DISTINCT | DISTINCT ON (..)] <projection> FROM <table>
//!   [WHERE <filters> AND <policy predicates>]
//!   [GROUP BY ..] [ORDER BY ..] [LIMIT n]
//! ```
//!
//! Every value goes through a placeholder. Enforced predicates from the
//! policy authority are appended after the intent's own filters, and the
//! related table of an `exists` filter gets its own predicates inside the
//! subquery.

use crate::error::CompileError;
use crate::statement::StatementBuilder;
use intentql_core::{
    AggregateFunc, Aggregation, BindCast, CompiledQuery, Filter, FilterOp, GuardrailsConfig,
    PredicateValue, Principal, QueryIntent, QueryShape, SqlDialect, parse_aggregate_expr,
};
use intentql_policy::PolicyAuthority;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Compiles intents to SQL for one dialect.
#[derive(Clone)]
pub struct Compiler {
    dialect: Arc<dyn SqlDialect>,
    guardrails: GuardrailsConfig,
    policy: Arc<dyn PolicyAuthority>,
}

impl Compiler {
    pub fn new(
        dialect: Arc<dyn SqlDialect>,
        guardrails: GuardrailsConfig,
        policy: Arc<dyn PolicyAuthority>,
    ) -> Self {
        Self {
            dialect,
            guardrails,
            policy,
        }
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// Compile an intent on behalf of `user`.
    pub fn compile(
        &self,
        intent: &QueryIntent,
        user: Option<&Principal>,
    ) -> Result<CompiledQuery, CompileError> {
        let table = intent.table.as_str();
        let mut stmt = StatementBuilder::new(self.dialect.as_ref(), intent.params.clone());

        let mut filters = intent.filters.clone();
        for (column, value) in self.enforced_predicates(user, table, Some(intent)) {
            filters.push(predicate_filter(&mut stmt, "policy", &column, value));
        }

        let mut sql = String::from("SELECT ");
        if !intent.distinct_on.is_empty() {
            if !self.dialect.supports_distinct_on() {
                return Err(CompileError::UnsupportedConstruct(format!(
                    "DISTINCT ON is not supported by {}",
                    self.dialect.name()
                )));
            }
            sql.push_str(&format!(
                "DISTINCT ON ({}) ",
                quote_list(&stmt, &intent.distinct_on)
            ));
        } else if intent.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&projection(&stmt, intent)?);
        sql.push_str(" FROM ");
        sql.push_str(&stmt.quote(table));

        let mut conditions = Vec::with_capacity(filters.len());
        for filter in &filters {
            conditions.push(self.condition(&mut stmt, table, filter, user)?);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !intent.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&quote_list(&stmt, &intent.group_by));
        }

        if !intent.order.is_empty() {
            let order: Vec<String> = intent
                .order
                .iter()
                .map(|o| format!("{} {}", stmt.quote(&o.column), o.direction.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = self.resolve_limit(intent)? {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let query = stmt.finish(sql);
        tracing::debug!(
            table,
            dialect = self.dialect.name(),
            placeholders = query.bind_spec.len(),
            "intent compiled"
        );
        Ok(query)
    }

    /// Explicit limit first, then the ceiling for the intent's shape.
    /// `None` means the statement carries no LIMIT.
    fn resolve_limit(&self, intent: &QueryIntent) -> Result<Option<u64>, CompileError> {
        if let Some(limit) = intent.limit {
            if limit <= 0 {
                return Err(CompileError::InvalidLimit(limit));
            }
            return Ok(Some(limit as u64));
        }

        let g = &self.guardrails;
        Ok(match intent.shape() {
            QueryShape::Count => g.count_limit,
            QueryShape::Aggregate => g.aggregation_limit,
            QueryShape::Exists => Some(g.exists_limit),
            QueryShape::Distinct => g.distinct_limit,
            QueryShape::Plain => Some(g.default_limit),
        })
    }

    /// Predicates the authority enforces on `table`. A failing authority
    /// contributes nothing.
    fn enforced_predicates(
        &self,
        user: Option<&Principal>,
        table: &str,
        intent: Option<&QueryIntent>,
    ) -> BTreeMap<String, PredicateValue> {
        match self.policy.apply(user, table, intent) {
            Ok(result) => result.enforced_predicates,
            Err(e) => {
                tracing::warn!(table, error = %e, "policy authority failed, compiling without enforced predicates");
                BTreeMap::new()
            }
        }
    }

    fn condition(
        &self,
        stmt: &mut StatementBuilder<'_>,
        table: &str,
        filter: &Filter,
        user: Option<&Principal>,
    ) -> Result<String, CompileError> {
        match &filter.op {
            FilterOp::Exists | FilterOp::NotExists => self.exists_condition(stmt, table, filter, user),
            _ => simple_condition(stmt, table, filter),
        }
    }

    fn exists_condition(
        &self,
        stmt: &mut StatementBuilder<'_>,
        table: &str,
        filter: &Filter,
        user: Option<&Principal>,
    ) -> Result<String, CompileError> {
        let op = filter.op.as_str();
        let related = filter
            .related_table
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CompileError::malformed(op, "related_table is required"))?;
        let fk = filter
            .fk_column
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CompileError::malformed(op, "fk_column is required"))?;

        let mut conditions = vec![format!(
            "{} = {}",
            stmt.qualified(related, fk),
            stmt.qualified(table, filter.base_column())
        )];

        let prefix = format!("policy_{}", related);
        for (column, value) in self.enforced_predicates(user, related, None) {
            let predicate = predicate_filter(stmt, &prefix, &column, value);
            conditions.push(simple_condition(stmt, related, &predicate)?);
        }

        for related_filter in &filter.related_filters {
            if related_filter.op.is_exists() {
                return Err(CompileError::malformed(
                    op,
                    "related filters cannot nest exists/not_exists",
                ));
            }
            conditions.push(simple_condition(stmt, related, related_filter)?);
        }

        let keyword = if filter.op == FilterOp::NotExists {
            "NOT EXISTS"
        } else {
            "EXISTS"
        };
        Ok(format!(
            "{} (SELECT 1 FROM {} WHERE {})",
            keyword,
            stmt.quote(related),
            conditions.join(" AND ")
        ))
    }
}

/// A non-subquery condition on `table`.
fn simple_condition(
    stmt: &mut StatementBuilder<'_>,
    table: &str,
    filter: &Filter,
) -> Result<String, CompileError> {
    let column = filter.column.as_str();
    if let FilterOp::Unknown(op) = &filter.op {
        return Err(CompileError::UnsupportedOperator {
            op: op.clone(),
            column: column.to_string(),
        });
    }
    if column.trim().is_empty() {
        return Err(CompileError::malformed(filter.op.as_str(), "column is required"));
    }

    let target = stmt.qualified(table, column);
    let fragment = match &filter.op {
        FilterOp::Between => {
            let (start, end) = filter.range_keys();
            let start = stmt.bind(&start, table, column, None);
            let end = stmt.bind(&end, table, column, None);
            format!("{} BETWEEN {} AND {}", target, start, end)
        }
        FilterOp::In => {
            let placeholder =
                stmt.bind(filter.param_key(), table, column, Some(BindCast::Array));
            stmt.dialect().array_membership(&target, &placeholder)
        }
        FilterOp::Like => {
            let placeholder = stmt.bind(filter.param_key(), table, column, None);
            format!("{} LIKE {}", target, placeholder)
        }
        FilterOp::Ilike => {
            let keyword = stmt.dialect().case_insensitive_like();
            let placeholder = stmt.bind(filter.param_key(), table, column, None);
            format!("{} {} {}", target, keyword, placeholder)
        }
        op => {
            let Some(comparison) = op.comparison() else {
                return Err(CompileError::UnsupportedOperator {
                    op: op.to_string(),
                    column: column.to_string(),
                });
            };
            let placeholder = stmt.bind(filter.param_key(), table, column, None);
            format!("{} {} {}", target, comparison, placeholder)
        }
    };
    Ok(fragment)
}

/// Turn an enforced predicate into a filter and store its value(s) as
/// `<prefix>_<column>` (or `_start`/`_end` for ranges).
fn predicate_filter(
    stmt: &mut StatementBuilder<'_>,
    prefix: &str,
    column: &str,
    value: PredicateValue,
) -> Filter {
    let key = format!("{}_{}", prefix, column.replace('.', "_"));
    match value {
        PredicateValue::Scalar(value) => {
            stmt.set_param(key.clone(), value);
            Filter::new(column, FilterOp::Eq, key)
        }
        PredicateValue::Range { start, end } => {
            let start_key = format!("{}_start", key);
            let end_key = format!("{}_end", key);
            stmt.set_param(start_key.clone(), start);
            stmt.set_param(end_key.clone(), end);
            Filter::between(column, start_key, end_key)
        }
    }
}

/// The SELECT list: plain columns, `*`, or aliased aggregates.
fn projection(stmt: &StatementBuilder<'_>, intent: &QueryIntent) -> Result<String, CompileError> {
    let mut items = Vec::new();
    let mut seen: Vec<Aggregation> = Vec::new();
    let aggregating = !intent.all_aggregations().is_empty();

    for column in &intent.columns {
        if column == "*" {
            if !aggregating {
                items.push("*".to_string());
            }
        } else if column.contains('(') {
            let agg = parse_aggregate_expr(column).ok_or_else(|| {
                CompileError::UnsupportedConstruct(format!("unrecognized expression '{}'", column))
            })?;
            items.push(aggregate_item(stmt, &agg)?);
            seen.push(agg);
        } else {
            items.push(stmt.quote(column));
        }
    }

    for agg in &intent.aggregations {
        if !seen.contains(agg) {
            items.push(aggregate_item(stmt, agg)?);
            seen.push(agg.clone());
        }
    }

    if items.is_empty() {
        return Ok("*".to_string());
    }
    Ok(items.join(", "))
}

fn aggregate_item(stmt: &StatementBuilder<'_>, agg: &Aggregation) -> Result<String, CompileError> {
    match agg.target() {
        None if agg.func == AggregateFunc::Count => {
            Ok(format!("COUNT(*) AS {}", stmt.quote("count")))
        }
        None => Err(CompileError::UnsupportedConstruct(format!(
            "{} requires a column",
            agg.func.name()
        ))),
        Some(column) => {
            let alias = format!("{}_{}", agg.func.name(), column.replace('.', "_"));
            Ok(format!(
                "{}({}) AS {}",
                agg.func.as_sql(),
                stmt.quote(column),
                stmt.quote(&alias)
            ))
        }
    }
}

fn quote_list(stmt: &StatementBuilder<'_>, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| stmt.quote(c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use intentql_core::{
        BindSpecEntry, Dialect, OrderSpec, PolicyConfig, SortDirection, TablePolicy, TenantScope,
    };
    use intentql_policy::{AllowAllPolicy, ConfigPolicy, PolicyError, PolicyResult};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    struct BrokenPolicy;

    impl PolicyAuthority for BrokenPolicy {
        fn apply(
            &self,
            _user: Option<&Principal>,
            _table: &str,
            _intent: Option<&QueryIntent>,
        ) -> Result<PolicyResult, PolicyError> {
            Err(PolicyError::Unavailable("timeout".to_string()))
        }
    }

    fn compiler(dialect: Dialect, policy: Arc<dyn PolicyAuthority>) -> Compiler {
        Compiler::new(Arc::new(dialect), GuardrailsConfig::default(), policy)
    }

    fn postgres() -> Compiler {
        compiler(Dialect::Postgres, Arc::new(AllowAllPolicy))
    }

    fn tenant_policy() -> Arc<dyn PolicyAuthority> {
        Arc::new(ConfigPolicy::new(PolicyConfig {
            tenant: Some(TenantScope::default()),
            tables: HashMap::new(),
        }))
    }

    fn unanswered_questions() -> QueryIntent {
        serde_json::from_value(json!({
            "table": "questions",
            "filters": [{
                "column": "id",
                "op": "not_exists",
                "related_table": "answers",
                "fk_column": "question_id",
                "base_column": "id",
                "related_filters": [{"column": "student_id", "op": "=", "param": "student_id"}]
            }],
            "params": {"student_id": 17963}
        }))
        .unwrap()
    }

    #[test]
    fn test_not_exists_subquery() {
        let query = postgres().compile(&unanswered_questions(), None).unwrap();

        assert_eq!(
            query.sql,
            "SELECT * FROM \"questions\" WHERE NOT EXISTS (SELECT 1 FROM \"answers\" \
             WHERE \"answers\".\"question_id\" = \"questions\".\"id\" \
             AND \"answers\".\"student_id\" = $1) LIMIT 200"
        );
        assert_eq!(
            query.bind_spec,
            vec![BindSpecEntry {
                key: "student_id".to_string(),
                column: "student_id".to_string(),
                table: "answers".to_string(),
                cast: None,
            }]
        );
        assert_eq!(query.bound_values(), vec![json!(17963)]);
    }

    #[test]
    fn test_values_only_travel_as_parameters() {
        let mut intent = QueryIntent::select("users");
        intent
            .filters
            .push(Filter::new("name", FilterOp::Eq, "name"));
        intent
            .params
            .insert("name".to_string(), json!("x' OR '1'='1"));

        let query = postgres().compile(&intent, None).unwrap();
        assert_eq!(
            query.sql,
            "SELECT * FROM \"users\" WHERE \"users\".\"name\" = $1 LIMIT 100"
        );
        assert!(!query.sql.contains("OR '1'"));
        assert_eq!(query.params["name"], json!("x' OR '1'='1"));
    }

    #[test]
    fn test_operator_rendering() {
        let mut intent = QueryIntent::select("orders");
        intent.filters = vec![
            Filter::new("status", FilterOp::In, "statuses"),
            Filter::between("created_at", "from", "to"),
            Filter::new("total", FilterOp::Gte, "min_total"),
            Filter::new("note", FilterOp::Neq, ""),
            Filter::new("email", FilterOp::Ilike, "pattern"),
        ];

        let query = postgres().compile(&intent, None).unwrap();
        assert_eq!(
            query.sql,
            "SELECT * FROM \"orders\" WHERE \"orders\".\"status\" = ANY($1) \
             AND \"orders\".\"created_at\" BETWEEN $2 AND $3 \
             AND \"orders\".\"total\" >= $4 \
             AND \"orders\".\"note\" <> $5 \
             AND \"orders\".\"email\" ILIKE $6 LIMIT 100"
        );
        let keys: Vec<&str> = query.bind_spec.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["statuses", "from", "to", "min_total", "note", "pattern"]);
        assert_eq!(query.bind_spec[0].cast, Some(BindCast::Array));
    }

    #[test]
    fn test_mysql_dialect() {
        let mut intent = QueryIntent::select("orders");
        intent.columns = vec!["id".to_string(), "email".to_string()];
        intent
            .filters
            .push(Filter::new("email", FilterOp::Ilike, "pattern"));
        intent.order.push(OrderSpec::new("id", SortDirection::Desc));

        let query = compiler(Dialect::Mysql, Arc::new(AllowAllPolicy))
            .compile(&intent, None)
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT `id`, `email` FROM `orders` WHERE `orders`.`email` LIKE ? \
             ORDER BY `id` DESC LIMIT 100"
        );
    }

    #[test]
    fn test_policy_predicates_are_injected() {
        let user = Principal::new("alice").with_attr("tenant_id", "acme");
        let mut intent = QueryIntent::select("orders");
        intent
            .filters
            .push(Filter::new("status", FilterOp::Eq, "status"));

        let query = compiler(Dialect::Postgres, tenant_policy())
            .compile(&intent, Some(&user))
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT * FROM \"orders\" WHERE \"orders\".\"status\" = $1 \
             AND \"orders\".\"tenant_id\" = $2 LIMIT 100"
        );
        assert_eq!(query.params["policy_tenant_id"], json!("acme"));
        assert_eq!(query.bind_spec[1].key, "policy_tenant_id");
    }

    #[test]
    fn test_range_predicate() {
        let mut tables = HashMap::new();
        tables.insert(
            "events".to_string(),
            TablePolicy {
                columns: None,
                predicates: BTreeMap::from([(
                    "created_at".to_string(),
                    PredicateValue::Range {
                        start: json!("2024-01-01"),
                        end: json!("2024-12-31"),
                    },
                )]),
            },
        );
        let policy = Arc::new(ConfigPolicy::new(PolicyConfig {
            tenant: None,
            tables,
        }));

        let query = compiler(Dialect::Postgres, policy)
            .compile(&QueryIntent::select("events"), None)
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT * FROM \"events\" WHERE \"events\".\"created_at\" BETWEEN $1 AND $2 LIMIT 100"
        );
        assert_eq!(query.params["policy_created_at_start"], json!("2024-01-01"));
        assert_eq!(query.params["policy_created_at_end"], json!("2024-12-31"));
    }

    #[test]
    fn test_related_table_predicates_share_the_counter() {
        let user = Principal::new("alice").with_attr("tenant_id", 7);
        let query = compiler(Dialect::Postgres, tenant_policy())
            .compile(&unanswered_questions(), Some(&user))
            .unwrap();

        assert_eq!(
            query.sql,
            "SELECT * FROM \"questions\" WHERE NOT EXISTS (SELECT 1 FROM \"answers\" \
             WHERE \"answers\".\"question_id\" = \"questions\".\"id\" \
             AND \"answers\".\"tenant_id\" = $1 \
             AND \"answers\".\"student_id\" = $2) \
             AND \"questions\".\"tenant_id\" = $3 LIMIT 200"
        );
        let keys: Vec<&str> = query.bind_spec.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["policy_answers_tenant_id", "student_id", "policy_tenant_id"]
        );
    }

    #[test]
    fn test_policy_failure_degrades_to_no_predicates() {
        let query = compiler(Dialect::Postgres, Arc::new(BrokenPolicy))
            .compile(&QueryIntent::select("orders"), None)
            .unwrap();
        assert_eq!(query.sql, "SELECT * FROM \"orders\" LIMIT 100");
    }

    #[test]
    fn test_limit_resolution_by_shape() {
        let c = postgres();

        let mut count = QueryIntent::select("orders");
        count.columns = vec!["count(*)".to_string()];
        assert_eq!(
            c.compile(&count, None).unwrap().sql,
            "SELECT COUNT(*) AS \"count\" FROM \"orders\""
        );

        let mut sum = QueryIntent::select("orders");
        sum.columns = vec!["status".to_string(), "sum(total)".to_string()];
        sum.group_by = vec!["status".to_string()];
        assert_eq!(
            c.compile(&sum, None).unwrap().sql,
            "SELECT \"status\", SUM(\"total\") AS \"sum_total\" FROM \"orders\" \
             GROUP BY \"status\" LIMIT 1000"
        );

        let mut distinct = QueryIntent::select("orders");
        distinct.columns = vec!["status".to_string()];
        distinct.distinct = true;
        assert_eq!(
            c.compile(&distinct, None).unwrap().sql,
            "SELECT DISTINCT \"status\" FROM \"orders\" LIMIT 1000"
        );

        distinct.limit = Some(5);
        assert!(c.compile(&distinct, None).unwrap().sql.ends_with("LIMIT 5"));

        distinct.limit = Some(0);
        assert_eq!(
            c.compile(&distinct, None).unwrap_err(),
            CompileError::InvalidLimit(0)
        );
    }

    #[test]
    fn test_explicit_aggregations() {
        let mut intent = QueryIntent::select("orders");
        intent.aggregations = vec![
            Aggregation {
                func: AggregateFunc::Avg,
                column: Some("total".to_string()),
            },
            Aggregation {
                func: AggregateFunc::Max,
                column: Some("total".to_string()),
            },
        ];
        assert_eq!(
            postgres().compile(&intent, None).unwrap().sql,
            "SELECT AVG(\"total\") AS \"avg_total\", MAX(\"total\") AS \"max_total\" \
             FROM \"orders\" LIMIT 1000"
        );

        intent.aggregations = vec![Aggregation {
            func: AggregateFunc::Sum,
            column: None,
        }];
        assert!(matches!(
            postgres().compile(&intent, None),
            Err(CompileError::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn test_distinct_on() {
        let mut intent = QueryIntent::select("orders");
        intent.distinct_on = vec!["customer_id".to_string()];
        intent
            .order
            .push(OrderSpec::new("customer_id", SortDirection::Asc));

        assert_eq!(
            postgres().compile(&intent, None).unwrap().sql,
            "SELECT DISTINCT ON (\"customer_id\") * FROM \"orders\" \
             ORDER BY \"customer_id\" ASC LIMIT 1000"
        );

        let err = compiler(Dialect::Sqlite, Arc::new(AllowAllPolicy))
            .compile(&intent, None)
            .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedConstruct(_)));
    }

    #[test]
    fn test_filter_errors() {
        let c = postgres();

        let mut intent = QueryIntent::select("orders");
        intent
            .filters
            .push(Filter::new("status", FilterOp::from("regex"), "p"));
        assert_eq!(
            c.compile(&intent, None).unwrap_err(),
            CompileError::UnsupportedOperator {
                op: "regex".to_string(),
                column: "status".to_string(),
            }
        );

        let mut intent = QueryIntent::select("orders");
        let mut exists = Filter::exists(FilterOp::Exists, "items", "order_id", vec![]);
        exists.fk_column = None;
        intent.filters.push(exists);
        assert!(matches!(
            c.compile(&intent, None).unwrap_err(),
            CompileError::MalformedFilter { reason, .. } if reason.contains("fk_column")
        ));

        let mut intent = QueryIntent::select("orders");
        intent.filters.push(Filter::exists(
            FilterOp::Exists,
            "items",
            "order_id",
            vec![Filter::exists(FilterOp::Exists, "skus", "item_id", vec![])],
        ));
        assert!(matches!(
            c.compile(&intent, None).unwrap_err(),
            CompileError::MalformedFilter { .. }
        ));
    }
}
