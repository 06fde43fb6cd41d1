//! Query intent model.
//!
//! These are passive value types. An intent is produced by an upstream planner,
//! checked by the validator, and turned into a [`CompiledQuery`] by the compiler.
//! No type here carries behavior beyond small accessors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The only statement kind an intent may request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    #[default]
    Select,
}

/// A structured request for a single SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    #[serde(default, rename = "type")]
    pub kind: IntentKind,

    pub table: String,

    /// Plain column names, `*`, or aggregate expressions such as `count(*)`.
    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub filters: Vec<Filter>,

    #[serde(default)]
    pub order: Vec<OrderSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// Values bound to placeholders. Never rendered into SQL text.
    #[serde(default)]
    pub params: BTreeMap<String, Value>,

    #[serde(default)]
    pub distinct: bool,

    #[serde(default)]
    pub distinct_on: Vec<String>,

    #[serde(default)]
    pub aggregations: Vec<Aggregation>,

    #[serde(default)]
    pub group_by: Vec<String>,
}

impl QueryIntent {
    /// Create a `SELECT *` intent for a table.
    pub fn select(table: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Select,
            table: table.into(),
            columns: vec!["*".to_string()],
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            params: BTreeMap::new(),
            distinct: false,
            distinct_on: Vec::new(),
            aggregations: Vec::new(),
            group_by: Vec::new(),
        }
    }

    /// Whether any filter (top level) is an `exists`/`not_exists` subquery.
    pub fn has_exists_filter(&self) -> bool {
        self.filters.iter().any(|f| f.op.is_exists())
    }

    /// Every aggregation the intent asks for: `func(...)` projection
    /// expressions followed by the explicit `aggregations` list.
    pub fn all_aggregations(&self) -> Vec<Aggregation> {
        let mut aggregations: Vec<Aggregation> = self
            .columns
            .iter()
            .filter_map(|c| parse_aggregate_expr(c))
            .collect();
        for agg in &self.aggregations {
            if !aggregations.contains(agg) {
                aggregations.push(agg.clone());
            }
        }
        aggregations
    }

    /// Classify the intent for limit resolution.
    pub fn shape(&self) -> QueryShape {
        let aggregations = self.all_aggregations();
        if aggregations.iter().any(|a| a.func == AggregateFunc::Count) {
            QueryShape::Count
        } else if !aggregations.is_empty() {
            QueryShape::Aggregate
        } else if self.has_exists_filter() {
            QueryShape::Exists
        } else if self.distinct || !self.distinct_on.is_empty() {
            QueryShape::Distinct
        } else {
            QueryShape::Plain
        }
    }

    /// Related tables referenced by `exists`/`not_exists` filters, in order of appearance.
    pub fn related_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for filter in &self.filters {
            if let Some(related) = filter.related_table.as_deref()
                && !tables.contains(&related)
            {
                tables.push(related);
            }
        }
        tables
    }
}

/// Query shapes that carry their own LIMIT ceiling, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    Count,
    Aggregate,
    Exists,
    Distinct,
    Plain,
}

/// A single WHERE condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Filtered column. For `exists`/`not_exists` this is a placeholder that
    /// defaults to `id`.
    #[serde(default)]
    pub column: String,

    pub op: FilterOp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_end: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_column: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_filters: Vec<Filter>,
}

impl Filter {
    /// A comparison filter bound to `param`.
    pub fn new(column: impl Into<String>, op: FilterOp, param: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op,
            param: Some(param.into()),
            param_start: None,
            param_end: None,
            related_table: None,
            fk_column: None,
            base_column: None,
            related_filters: Vec::new(),
        }
    }

    /// A `BETWEEN` filter bound to two parameters.
    pub fn between(
        column: impl Into<String>,
        param_start: impl Into<String>,
        param_end: impl Into<String>,
    ) -> Self {
        Self {
            param: None,
            param_start: Some(param_start.into()),
            param_end: Some(param_end.into()),
            ..Self::new(column, FilterOp::Between, "")
        }
    }

    /// A correlated `EXISTS`/`NOT EXISTS` filter.
    pub fn exists(
        op: FilterOp,
        related_table: impl Into<String>,
        fk_column: impl Into<String>,
        related_filters: Vec<Filter>,
    ) -> Self {
        Self {
            column: "id".to_string(),
            op,
            param: None,
            param_start: None,
            param_end: None,
            related_table: Some(related_table.into()),
            fk_column: Some(fk_column.into()),
            base_column: Some("id".to_string()),
            related_filters,
        }
    }

    /// Parameter key for single-value operators. Falls back to the column name.
    pub fn param_key(&self) -> &str {
        match self.param.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => &self.column,
        }
    }

    /// Parameter keys for `between`. Fall back to `<column>_start` / `<column>_end`.
    pub fn range_keys(&self) -> (String, String) {
        let start = match self.param_start.as_deref() {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => format!("{}_start", self.column),
        };
        let end = match self.param_end.as_deref() {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => format!("{}_end", self.column),
        };
        (start, end)
    }

    /// Column of the main table the subquery correlates on.
    pub fn base_column(&self) -> &str {
        match self.base_column.as_deref() {
            Some(c) if !c.is_empty() => c,
            _ => "id",
        }
    }
}

/// Filter operators.
///
/// Deserialized from a string; symbolic spellings (`=`, `<>`, `>=`...) map to
/// their named counterparts. Anything unrecognized is preserved in
/// [`FilterOp::Unknown`] so the validator and compiler can report it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Between,
    In,
    Like,
    Ilike,
    Exists,
    NotExists,
    Unknown(String),
}

impl FilterOp {
    pub fn is_exists(&self) -> bool {
        matches!(self, FilterOp::Exists | FilterOp::NotExists)
    }

    /// SQL comparison operator for the simple binary operators.
    pub fn comparison(&self) -> Option<&'static str> {
        match self {
            FilterOp::Eq => Some("="),
            FilterOp::Neq => Some("<>"),
            FilterOp::Gt => Some(">"),
            FilterOp::Lt => Some("<"),
            FilterOp::Gte => Some(">="),
            FilterOp::Lte => Some("<="),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Lt => "lt",
            FilterOp::Gte => "gte",
            FilterOp::Lte => "lte",
            FilterOp::Between => "between",
            FilterOp::In => "in",
            FilterOp::Like => "like",
            FilterOp::Ilike => "ilike",
            FilterOp::Exists => "exists",
            FilterOp::NotExists => "not_exists",
            FilterOp::Unknown(raw) => raw,
        }
    }
}

impl From<String> for FilterOp {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "eq" | "=" | "==" => FilterOp::Eq,
            "neq" | "ne" | "!=" | "<>" => FilterOp::Neq,
            "gt" | ">" => FilterOp::Gt,
            "lt" | "<" => FilterOp::Lt,
            "gte" | ">=" => FilterOp::Gte,
            "lte" | "<=" => FilterOp::Lte,
            "between" => FilterOp::Between,
            "in" => FilterOp::In,
            "like" => FilterOp::Like,
            "ilike" => FilterOp::Ilike,
            "exists" => FilterOp::Exists,
            "not_exists" | "not exists" => FilterOp::NotExists,
            _ => FilterOp::Unknown(raw),
        }
    }
}

impl From<&str> for FilterOp {
    fn from(raw: &str) -> Self {
        FilterOp::from(raw.to_string())
    }
}

impl From<FilterOp> for String {
    fn from(op: FilterOp) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub column: String,
    #[serde(default, alias = "dir")]
    pub direction: SortDirection,
}

impl OrderSpec {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

/// Sort direction. Case-insensitive; anything other than `desc` is ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl From<String> for SortDirection {
    fn from(raw: String) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

impl From<SortDirection> for String {
    fn from(direction: SortDirection) -> Self {
        direction.as_sql().to_ascii_lowercase()
    }
}

/// Aggregate functions recognized in projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFunc {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunc::Count),
            "sum" => Some(AggregateFunc::Sum),
            "avg" => Some(AggregateFunc::Avg),
            "max" => Some(AggregateFunc::Max),
            "min" => Some(AggregateFunc::Min),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Min => "MIN",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Avg => "avg",
            AggregateFunc::Max => "max",
            AggregateFunc::Min => "min",
        }
    }
}

/// An explicit aggregation request. `column` of `None` or `*` means all rows
/// and is only meaningful for `count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    #[serde(rename = "type")]
    pub func: AggregateFunc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl Aggregation {
    /// The aggregated column, `None` for `*`.
    pub fn target(&self) -> Option<&str> {
        match self.column.as_deref() {
            None | Some("*") | Some("") => None,
            Some(c) => Some(c),
        }
    }
}

/// Parse a `func(column)` / `func(*)` projection expression.
///
/// Returns `None` when `expr` is not an aggregate call of a recognized
/// function. `count(*)` yields `column: None`.
pub fn parse_aggregate_expr(expr: &str) -> Option<Aggregation> {
    let expr = expr.trim();
    let open = expr.find('(')?;
    if !expr.ends_with(')') {
        return None;
    }
    let func = AggregateFunc::parse(&expr[..open])?;
    let inner = expr[open + 1..expr.len() - 1].trim();
    let column = match inner {
        "*" => None,
        "" => return None,
        c if c.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.') => {
            Some(c.to_string())
        }
        _ => return None,
    };
    Some(Aggregation { func, column })
}

/// How a bound value must be cast when handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindCast {
    Array,
}

/// Maps one placeholder (by position) to the parameter that fills it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindSpecEntry {
    pub key: String,
    /// Column the value is compared to, for type inference at bind time.
    pub column: String,
    /// Table that owns `column`, possibly schema-qualified.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<BindCast>,
}

/// Output of the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: BTreeMap<String, Value>,
    pub bind_spec: Vec<BindSpecEntry>,
}

impl CompiledQuery {
    /// Values in placeholder order. Missing keys bind as `null`.
    pub fn bound_values(&self) -> Vec<Value> {
        self.bind_spec
            .iter()
            .map(|entry| self.params.get(&entry.key).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// The requesting user, as seen by the policy authority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Arbitrary attributes (tenant id, region...) available to policies.
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_intent_deserializes_with_defaults() {
        let intent: QueryIntent = serde_json::from_value(json!({
            "type": "select",
            "table": "questions",
            "columns": ["id"],
            "filters": [{"column": "id", "op": "not_exists", "related_table": "answers", "fk_column": "question_id"}],
            "order": [{"column": "id", "direction": "DESC"}]
        }))
        .unwrap();

        assert_eq!(intent.kind, IntentKind::Select);
        assert_eq!(intent.limit, None);
        assert!(intent.has_exists_filter());
        assert_eq!(intent.related_tables(), vec!["answers"]);
        assert_eq!(intent.order[0].direction, SortDirection::Desc);
        assert_eq!(intent.filters[0].base_column(), "id");
    }

    #[test]
    fn test_shape_precedence() {
        let mut intent = QueryIntent::select("orders");
        assert_eq!(intent.shape(), QueryShape::Plain);

        intent.distinct = true;
        assert_eq!(intent.shape(), QueryShape::Distinct);

        intent
            .filters
            .push(Filter::exists(FilterOp::Exists, "items", "order_id", vec![]));
        assert_eq!(intent.shape(), QueryShape::Exists);

        intent.aggregations.push(Aggregation {
            func: AggregateFunc::Sum,
            column: Some("total".to_string()),
        });
        assert_eq!(intent.shape(), QueryShape::Aggregate);

        intent.columns = vec!["count(*)".to_string()];
        assert_eq!(intent.shape(), QueryShape::Count);
        assert_eq!(intent.all_aggregations().len(), 2);
    }

    #[test]
    fn test_symbolic_operators() {
        assert_eq!(FilterOp::from("="), FilterOp::Eq);
        assert_eq!(FilterOp::from("<>"), FilterOp::Neq);
        assert_eq!(FilterOp::from(">="), FilterOp::Gte);
        assert_eq!(FilterOp::from("ILIKE"), FilterOp::Ilike);
        assert_eq!(
            FilterOp::from("regex"),
            FilterOp::Unknown("regex".to_string())
        );
    }

    #[test]
    fn test_unrecognized_direction_is_ascending() {
        let spec: OrderSpec =
            serde_json::from_value(json!({"column": "name", "direction": "sideways"})).unwrap();
        assert_eq!(spec.direction, SortDirection::Asc);
    }

    #[test]
    fn test_parse_aggregate_expr() {
        assert_eq!(
            parse_aggregate_expr("COUNT(*)"),
            Some(Aggregation {
                func: AggregateFunc::Count,
                column: None
            })
        );
        assert_eq!(
            parse_aggregate_expr("sum(amount)"),
            Some(Aggregation {
                func: AggregateFunc::Sum,
                column: Some("amount".to_string())
            })
        );
        assert_eq!(parse_aggregate_expr("amount"), None);
        assert_eq!(parse_aggregate_expr("median(amount)"), None);
        assert_eq!(parse_aggregate_expr("sum(amount); drop"), None);
    }

    #[test]
    fn test_param_key_falls_back_to_column() {
        let mut filter = Filter::new("status", FilterOp::Eq, "");
        assert_eq!(filter.param_key(), "status");
        filter.param = Some("wanted".to_string());
        assert_eq!(filter.param_key(), "wanted");

        let range = Filter::between("created_at", "", "");
        assert_eq!(
            range.range_keys(),
            ("created_at_start".to_string(), "created_at_end".to_string())
        );
    }

    #[test]
    fn test_bound_values_follow_bind_spec() {
        let query = CompiledQuery {
            sql: "SELECT * FROM t WHERE a = $1 AND b = $2".to_string(),
            params: BTreeMap::from([("a".to_string(), json!(1))]),
            bind_spec: vec![
                BindSpecEntry {
                    key: "a".to_string(),
                    column: "a".to_string(),
                    table: "t".to_string(),
                    cast: None,
                },
                BindSpecEntry {
                    key: "b".to_string(),
                    column: "b".to_string(),
                    table: "t".to_string(),
                    cast: None,
                },
            ],
        };
        assert_eq!(query.bound_values(), vec![json!(1), Value::Null]);
    }
}
