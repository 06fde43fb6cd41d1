//! Intent validator.
//!
//! The `IntentValidator` is the first stage of the pipeline. It checks an
//! intent in this order and stops at the first violation:
//!
//! 1. **Normalization** - `exists`/`not_exists` filters get `column`/`base_column` of `id`,
//!    a plain select without a limit gets the configured default limit. Counts,
//!    aggregations, `exists` and distinct selects keep an absent limit so the
//!    compiler can apply their own ceilings.
//! 2. **Shape** - required fields, identifiers, limit bounds, per-filter structure
//! 3. **Caller allowlist** - the table (and related tables) must be in `allow_tables`
//! 4. **Policy** - the authority's table and column allowlists, including the
//!    columns of related tables used by `exists`/`not_exists` filters

use crate::error::ValidationError;
use crate::{PolicyAuthority, PolicyResult};
use intentql_core::{
    AggregateFunc, Filter, FilterOp, GuardrailsConfig, Principal, QueryIntent,
    QueryShape, parse_aggregate_expr,
};
use std::sync::Arc;

/// Validates intents against shape rules, the caller allowlist and a policy authority.
#[derive(Clone)]
pub struct IntentValidator {
    guardrails: GuardrailsConfig,
    policy: Arc<dyn PolicyAuthority>,
}

impl IntentValidator {
    /// Create a new validator.
    pub fn new(guardrails: GuardrailsConfig, policy: Arc<dyn PolicyAuthority>) -> Self {
        Self { guardrails, policy }
    }

    /// Validate an intent, returning the normalized copy.
    ///
    /// The input is not modified. Validating the returned intent again yields
    /// the same intent.
    pub fn validate(
        &self,
        intent: &QueryIntent,
        user: Option<&Principal>,
        allow_tables: &[String],
    ) -> Result<QueryIntent, ValidationError> {
        let mut intent = intent.clone();
        normalize_filters(&mut intent.filters);
        if intent.limit.is_none() && intent.shape() == QueryShape::Plain {
            intent.limit = Some(self.guardrails.default_limit as i64);
        }

        self.validate_shape(&intent)?;

        if !allow_tables.is_empty() {
            for table in std::iter::once(intent.table.as_str()).chain(intent.related_tables()) {
                if !allow_tables.iter().any(|t| t.eq_ignore_ascii_case(table)) {
                    return Err(ValidationError::table_not_allowed(table));
                }
            }
        }

        self.validate_policy(&intent, user)?;

        tracing::debug!(
            table = %intent.table,
            filters = intent.filters.len(),
            limit = ?intent.limit,
            "intent validated"
        );

        Ok(intent)
    }

    fn validate_shape(&self, intent: &QueryIntent) -> Result<(), ValidationError> {
        if intent.table.trim().is_empty() {
            return Err(ValidationError::missing_field("table"));
        }
        check_identifier("table", &intent.table)?;

        if intent.columns.is_empty() {
            return Err(ValidationError::missing_field("columns"));
        }
        for (i, column) in intent.columns.iter().enumerate() {
            let field = format!("columns[{}]", i);
            if column.trim().is_empty() {
                return Err(ValidationError::missing_field(&field));
            }
            if column == "*" {
                continue;
            }
            if column.contains('(') {
                let Some(agg) = parse_aggregate_expr(column) else {
                    return Err(ValidationError::invalid_identifier(&field, column));
                };
                if agg.column.is_none() && agg.func != AggregateFunc::Count {
                    return Err(ValidationError::invalid_identifier(&field, column));
                }
                continue;
            }
            check_identifier(&field, column)?;
        }

        if let Some(limit) = intent.limit {
            if limit <= 0 {
                return Err(ValidationError::invalid_limit(limit));
            }
            if limit as u64 > self.guardrails.max_limit {
                return Err(ValidationError::limit_exceeded(limit, self.guardrails.max_limit));
            }
        }

        for (i, order) in intent.order.iter().enumerate() {
            check_identifier(&format!("order[{}].column", i), &order.column)?;
        }
        for (i, column) in intent.distinct_on.iter().enumerate() {
            check_identifier(&format!("distinct_on[{}]", i), column)?;
        }
        for (i, column) in intent.group_by.iter().enumerate() {
            check_identifier(&format!("group_by[{}]", i), column)?;
        }
        for (i, agg) in intent.aggregations.iter().enumerate() {
            if let Some(column) = agg.target() {
                check_identifier(&format!("aggregations[{}].column", i), column)?;
            }
        }

        for (i, filter) in intent.filters.iter().enumerate() {
            validate_filter(&format!("filters[{}]", i), filter, true)?;
        }

        Ok(())
    }

    fn consult(
        &self,
        user: Option<&Principal>,
        table: &str,
        intent: Option<&QueryIntent>,
    ) -> Result<PolicyResult, ValidationError> {
        self.policy.apply(user, table, intent).map_err(|e| {
            tracing::warn!(table, error = %e, "policy authority failed during validation");
            ValidationError::policy_unavailable(table, &e.to_string())
        })
    }

    fn validate_policy(
        &self,
        intent: &QueryIntent,
        user: Option<&Principal>,
    ) -> Result<(), ValidationError> {
        let table = intent.table.as_str();
        let result = self.consult(user, table, Some(intent))?;

        if !result.allows_table(table) {
            return Err(ValidationError::table_not_allowed(table));
        }

        let allowed = result.columns_for(table);
        for column in referenced_columns(intent) {
            let permitted = qualifier_matches(table, column)
                && allowed.is_none_or(|allowed| column_allowed(allowed, column));
            if !permitted {
                return Err(ValidationError::column_not_allowed(table, column));
            }
        }

        for filter in intent.filters.iter().filter(|f| f.op.is_exists()) {
            let Some(related) = filter.related_table.as_deref() else {
                continue;
            };
            let related_result = self.consult(user, related, None)?;
            if !result.allows_table(related) || !related_result.allows_table(related) {
                return Err(ValidationError::table_not_allowed(related));
            }
            let allowed = related_result.columns_for(related);
            let fk = filter.fk_column.as_deref().unwrap_or_default();
            let related_columns = std::iter::once(fk)
                .chain(filter.related_filters.iter().map(|f| f.column.as_str()));
            for column in related_columns {
                let permitted = qualifier_matches(related, column)
                    && allowed.is_none_or(|allowed| column_allowed(allowed, column));
                if !permitted {
                    return Err(ValidationError::column_not_allowed(related, column));
                }
            }
        }

        Ok(())
    }
}

/// Give `exists`/`not_exists` filters their `id` defaults.
fn normalize_filters(filters: &mut [Filter]) {
    for filter in filters.iter_mut().filter(|f| f.op.is_exists()) {
        if filter.column.trim().is_empty() {
            filter.column = "id".to_string();
        }
        if filter.base_column.as_deref().is_none_or(|c| c.trim().is_empty()) {
            filter.base_column = Some("id".to_string());
        }
    }
}

fn validate_filter(field: &str, filter: &Filter, allow_exists: bool) -> Result<(), ValidationError> {
    match &filter.op {
        FilterOp::Unknown(op) => Err(ValidationError::unsupported_operator(field, op)),
        FilterOp::Exists | FilterOp::NotExists => {
            if !allow_exists {
                return Err(ValidationError::invalid_filter(
                    field,
                    "related filters cannot nest exists/not_exists",
                ));
            }
            let related = filter.related_table.as_deref().unwrap_or_default();
            if related.trim().is_empty() {
                return Err(ValidationError::invalid_filter(field, "related_table is required"));
            }
            check_identifier(&format!("{}.related_table", field), related)?;

            let fk = filter.fk_column.as_deref().unwrap_or_default();
            if fk.trim().is_empty() {
                return Err(ValidationError::invalid_filter(field, "fk_column is required"));
            }
            check_identifier(&format!("{}.fk_column", field), fk)?;
            check_identifier(&format!("{}.base_column", field), filter.base_column())?;

            for (i, related_filter) in filter.related_filters.iter().enumerate() {
                validate_filter(&format!("{}.related_filters[{}]", field, i), related_filter, false)?;
            }
            Ok(())
        }
        op => {
            if filter.column.trim().is_empty() {
                return Err(ValidationError::invalid_filter(field, "column is required"));
            }
            if *op == FilterOp::Between {
                let bound = |p: &Option<String>| p.as_deref().is_some_and(|p| !p.trim().is_empty());
                if !bound(&filter.param_start) || !bound(&filter.param_end) {
                    return Err(ValidationError::invalid_filter(
                        field,
                        "between requires param_start and param_end",
                    ));
                }
            }
            check_identifier(&format!("{}.column", field), &filter.column)
        }
    }
}

/// Every main-table column an intent references. `*` is never returned.
fn referenced_columns(intent: &QueryIntent) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();

    for column in &intent.columns {
        if column.contains('(') {
            if parse_aggregate_expr(column).is_some_and(|agg| agg.column.is_some())
                && let Some(argument) = aggregate_argument(column)
            {
                columns.push(argument);
            }
        } else {
            columns.push(column);
        }
    }
    columns.extend(intent.order.iter().map(|o| o.column.as_str()));
    columns.extend(intent.distinct_on.iter().map(String::as_str));
    columns.extend(intent.group_by.iter().map(String::as_str));
    columns.extend(intent.aggregations.iter().filter_map(|a| a.target()));
    for filter in &intent.filters {
        if filter.op.is_exists() {
            columns.push(filter.base_column());
        } else {
            columns.push(&filter.column);
        }
    }

    columns.retain(|c| *c != "*");
    columns
}

/// The text between the parentheses of `func(arg)`.
fn aggregate_argument(expr: &str) -> Option<&str> {
    let open = expr.find('(')?;
    let close = expr.rfind(')')?;
    (open < close).then(|| expr[open + 1..close].trim())
}

fn column_allowed(allowed: &[String], column: &str) -> bool {
    let bare = column.rsplit('.').next().unwrap_or(column);
    allowed.iter().any(|a| a == "*" || a.eq_ignore_ascii_case(bare))
}

/// A qualified column must name `table`, either in full or by its last segment.
fn qualifier_matches(table: &str, column: &str) -> bool {
    let Some((qualifier, _)) = column.rsplit_once('.') else {
        return true;
    };
    let bare_table = table.rsplit('.').next().unwrap_or(table);
    qualifier.eq_ignore_ascii_case(table) || qualifier.eq_ignore_ascii_case(bare_table)
}

fn check_identifier(field: &str, name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(ValidationError::invalid_identifier(field, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;
    use crate::{AllowAllPolicy, PolicyError};
    use intentql_core::{OrderSpec, SortDirection};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// Restricts tables and columns like a role definition would.
    struct RolePolicy {
        tables: Vec<String>,
        columns: HashMap<String, Vec<String>>,
    }

    impl PolicyAuthority for RolePolicy {
        fn apply(
            &self,
            _user: Option<&Principal>,
            table: &str,
            _intent: Option<&QueryIntent>,
        ) -> Result<PolicyResult, PolicyError> {
            Ok(PolicyResult {
                allowed_tables: self.tables.clone(),
                allowed_columns: self
                    .columns
                    .get(table)
                    .map(|cols| HashMap::from([(table.to_string(), cols.clone())]))
                    .unwrap_or_default(),
                ..Default::default()
            })
        }
    }

    struct BrokenPolicy;

    impl PolicyAuthority for BrokenPolicy {
        fn apply(
            &self,
            _user: Option<&Principal>,
            _table: &str,
            _intent: Option<&QueryIntent>,
        ) -> Result<PolicyResult, PolicyError> {
            Err(PolicyError::Unavailable("connection refused".to_string()))
        }
    }

    fn role_policy() -> Arc<dyn PolicyAuthority> {
        Arc::new(RolePolicy {
            tables: vec!["questions".to_string(), "answers".to_string()],
            columns: HashMap::from([
                (
                    "questions".to_string(),
                    vec!["id".to_string(), "title".to_string(), "created_at".to_string()],
                ),
                (
                    "answers".to_string(),
                    vec!["question_id".to_string(), "student_id".to_string()],
                ),
            ]),
        })
    }

    fn validator(policy: Arc<dyn PolicyAuthority>) -> IntentValidator {
        IntentValidator::new(GuardrailsConfig::default(), policy)
    }

    fn questions_intent() -> QueryIntent {
        let mut intent = QueryIntent::select("questions");
        intent.columns = vec!["id".to_string(), "title".to_string()];
        intent
    }

    fn unanswered_filter(related_column: &str) -> Filter {
        let mut filter = Filter::exists(
            FilterOp::NotExists,
            "answers",
            "question_id",
            vec![Filter::new(related_column, FilterOp::Eq, "student_id")],
        );
        filter.column = String::new();
        filter.base_column = None;
        filter
    }

    #[test]
    fn test_default_limit_applied() {
        let result = validator(Arc::new(AllowAllPolicy))
            .validate(&questions_intent(), None, &[])
            .unwrap();
        assert_eq!(result.limit, Some(100));
    }

    #[test]
    fn test_shaped_intents_keep_absent_limit() {
        let mut intent = questions_intent();
        intent.columns = vec!["count(*)".to_string()];
        let result = validator(Arc::new(AllowAllPolicy))
            .validate(&intent, None, &[])
            .unwrap();
        assert_eq!(result.limit, None);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut intent = questions_intent();
        intent.filters.push(unanswered_filter("student_id"));
        let v = validator(role_policy());

        let once = v.validate(&intent, None, &[]).unwrap();
        let twice = v.validate(&once, None, &[]).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.filters[0].column, "id");
        assert_eq!(once.filters[0].base_column.as_deref(), Some("id"));
        // the input is untouched
        assert_eq!(intent.limit, None);
        assert_eq!(intent.filters[0].column, "");
    }

    #[test]
    fn test_missing_columns() {
        let mut intent = questions_intent();
        intent.columns.clear();
        let err = validator(Arc::new(AllowAllPolicy))
            .validate(&intent, None, &[])
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::MissingField);
        assert_eq!(err.field.as_deref(), Some("columns"));
    }

    #[test]
    fn test_limit_bounds() {
        let v = validator(Arc::new(AllowAllPolicy));
        let mut intent = questions_intent();

        intent.limit = Some(0);
        assert_eq!(
            v.validate(&intent, None, &[]).unwrap_err().kind,
            ValidationErrorKind::InvalidLimit
        );

        intent.limit = Some(10_001);
        assert_eq!(
            v.validate(&intent, None, &[]).unwrap_err().kind,
            ValidationErrorKind::LimitExceeded
        );

        intent.limit = Some(500);
        assert_eq!(v.validate(&intent, None, &[]).unwrap().limit, Some(500));
    }

    #[test]
    fn test_caller_allowlist_is_case_insensitive() {
        let v = validator(Arc::new(AllowAllPolicy));
        let intent = questions_intent();

        assert!(v.validate(&intent, None, &["Questions".to_string()]).is_ok());

        let err = v
            .validate(&intent, None, &["users".to_string()])
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TableNotAllowed);
        assert!(err.message.contains("table not allowed"));
    }

    #[test]
    fn test_related_table_must_be_in_caller_allowlist() {
        let mut intent = questions_intent();
        intent.filters.push(unanswered_filter("student_id"));
        let err = validator(Arc::new(AllowAllPolicy))
            .validate(&intent, None, &["questions".to_string()])
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TableNotAllowed);
        assert!(err.message.contains("answers"));
    }

    #[test]
    fn test_policy_table_allowlist() {
        let intent = QueryIntent::select("admin_secrets");
        let err = validator(role_policy())
            .validate(&intent, None, &[])
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TableNotAllowed);
    }

    #[test]
    fn test_policy_column_allowlist_covers_every_clause() {
        let v = validator(role_policy());

        let mut intent = questions_intent();
        intent.columns.push("body".to_string());
        let err = v.validate(&intent, None, &[]).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::ColumnNotAllowed);
        assert!(err.message.contains("'body'"));
        assert!(err.message.contains("'questions'"));

        let mut intent = questions_intent();
        intent.order.push(OrderSpec::new("score", SortDirection::Desc));
        assert_eq!(
            v.validate(&intent, None, &[]).unwrap_err().field.as_deref(),
            Some("score")
        );

        let mut intent = questions_intent();
        intent.group_by.push("author_id".to_string());
        assert!(v.validate(&intent, None, &[]).is_err());

        let mut intent = questions_intent();
        intent.columns = vec!["count(*)".to_string(), "max(created_at)".to_string()];
        assert!(v.validate(&intent, None, &[]).is_ok());

        let mut intent = questions_intent();
        intent.columns = vec!["sum(points)".to_string()];
        assert!(v.validate(&intent, None, &[]).is_err());

        let mut intent = questions_intent();
        intent.filters.push(Filter::new("secret", FilterOp::Eq, "secret"));
        assert!(v.validate(&intent, None, &[]).is_err());
    }

    #[test]
    fn test_star_is_exempt() {
        let intent = QueryIntent::select("questions");
        assert!(validator(role_policy()).validate(&intent, None, &[]).is_ok());
    }

    #[test]
    fn test_related_filter_columns_checked_against_related_table() {
        let v = validator(role_policy());

        let mut intent = questions_intent();
        intent.filters.push(unanswered_filter("student_id"));
        assert!(v.validate(&intent, None, &[]).is_ok());

        let mut intent = questions_intent();
        intent.filters.push(unanswered_filter("grade"));
        let err = v.validate(&intent, None, &[]).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::ColumnNotAllowed);
        assert!(err.message.contains("'answers'"));
    }

    #[test]
    fn test_exists_requires_related_table_and_fk() {
        let v = validator(Arc::new(AllowAllPolicy));

        let mut intent = questions_intent();
        let mut filter = unanswered_filter("student_id");
        filter.related_table = None;
        intent.filters.push(filter);
        let err = v.validate(&intent, None, &[]).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidFilter);
        assert!(err.message.contains("related_table"));

        let mut intent = questions_intent();
        let mut filter = unanswered_filter("student_id");
        filter.fk_column = Some(" ".to_string());
        intent.filters.push(filter);
        let err = v.validate(&intent, None, &[]).unwrap_err();
        assert!(err.message.contains("fk_column"));
    }

    #[test]
    fn test_nested_exists_rejected() {
        let mut intent = questions_intent();
        let mut filter = unanswered_filter("student_id");
        filter
            .related_filters
            .push(Filter::exists(FilterOp::Exists, "grades", "answer_id", vec![]));
        intent.filters.push(filter);
        let err = validator(Arc::new(AllowAllPolicy))
            .validate(&intent, None, &[])
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidFilter);
    }

    #[test]
    fn test_shape_errors() {
        let v = validator(Arc::new(AllowAllPolicy));

        let mut intent = questions_intent();
        intent.filters.push(Filter::new("", FilterOp::Eq, "x"));
        assert_eq!(
            v.validate(&intent, None, &[]).unwrap_err().kind,
            ValidationErrorKind::InvalidFilter
        );

        let mut intent = questions_intent();
        intent.filters.push(Filter::new("id", FilterOp::from("regexp"), "x"));
        assert_eq!(
            v.validate(&intent, None, &[]).unwrap_err().kind,
            ValidationErrorKind::UnsupportedOperator
        );

        let mut intent = questions_intent();
        intent.columns = vec!["id; DROP TABLE users".to_string()];
        assert_eq!(
            v.validate(&intent, None, &[]).unwrap_err().kind,
            ValidationErrorKind::InvalidIdentifier
        );

        let mut intent = questions_intent();
        intent.columns = vec!["sum(*)".to_string()];
        assert_eq!(
            v.validate(&intent, None, &[]).unwrap_err().kind,
            ValidationErrorKind::InvalidIdentifier
        );
    }

    #[test]
    fn test_between_requires_both_bounds() {
        let v = validator(Arc::new(AllowAllPolicy));

        let mut intent = questions_intent();
        let mut range = Filter::between("created_at", "from", "to");
        range.param_start = None;
        range.param_end = None;
        intent.filters.push(range);
        let err = v.validate(&intent, None, &[]).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidFilter);
        assert_eq!(err.field.as_deref(), Some("filters[0]"));
        assert!(err.message.contains("param_start and param_end"));

        let mut intent = questions_intent();
        intent.filters.push(Filter::between("created_at", "from", " "));
        assert_eq!(
            v.validate(&intent, None, &[]).unwrap_err().kind,
            ValidationErrorKind::InvalidFilter
        );

        let mut intent = questions_intent();
        intent.filters.push(Filter::between("created_at", "from", "to"));
        assert!(v.validate(&intent, None, &[]).is_ok());
    }

    #[test]
    fn test_qualified_columns_must_name_their_table() {
        let v = validator(role_policy());

        let mut intent = questions_intent();
        intent.columns.push("questions.title".to_string());
        assert!(v.validate(&intent, None, &[]).is_ok());

        // `id` is allowed on questions, but not through another table
        let mut intent = questions_intent();
        intent.columns.push("secrets.id".to_string());
        let err = v.validate(&intent, None, &[]).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::ColumnNotAllowed);
        assert_eq!(err.field.as_deref(), Some("secrets.id"));

        // also without a column allowlist
        let mut intent = questions_intent();
        intent.filters.push(Filter::new("users.password", FilterOp::Eq, "pw"));
        assert_eq!(
            validator(Arc::new(AllowAllPolicy))
                .validate(&intent, None, &[])
                .unwrap_err()
                .kind,
            ValidationErrorKind::ColumnNotAllowed
        );

        let mut intent = questions_intent();
        intent.filters.push(unanswered_filter("answers.student_id"));
        assert!(v.validate(&intent, None, &[]).is_ok());

        let mut intent = questions_intent();
        intent.filters.push(unanswered_filter("questions.id"));
        let err = v.validate(&intent, None, &[]).unwrap_err();
        assert!(err.message.contains("'answers'"));
    }

    #[test]
    fn test_policy_failure_is_reported() {
        let err = validator(Arc::new(BrokenPolicy))
            .validate(&questions_intent(), None, &[])
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::PolicyUnavailable);
    }
}
