use async_trait::async_trait;
use intentql_core::{Filter, FilterOp, IntentqlConfig, Principal, QueryIntent};
use intentql_guard::{PlanProvider, PlanRequest, QueryPlan, ViolationKind};
use intentql_policy::ValidationErrorKind;
use intentql_runtime::{Pipeline, PipelineError};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const TENANT_CONFIG: &str = r#"
dialect: postgres
policy:
  tenant:
    column: tenant_id
    attribute: tenant_id
    global_tables: [countries]
  tables:
    orders: {}
    countries: {}
    questions: {}
    answers: {}
    users:
      columns: [id, name]
"#;

fn tenant_pipeline() -> Pipeline {
    Pipeline::from_config(IntentqlConfig::from_yaml(TENANT_CONFIG).unwrap()).unwrap()
}

fn alice() -> Principal {
    Principal::new("alice").with_attr("tenant_id", "acme")
}

fn open_orders() -> QueryIntent {
    let mut intent = QueryIntent::select("orders");
    intent
        .filters
        .push(Filter::new("status", FilterOp::Eq, "status"));
    intent.params.insert("status".to_string(), json!("open"));
    intent
}

struct FixedPlan {
    plan: Option<Value>,
    calls: AtomicUsize,
}

impl FixedPlan {
    fn returning(plan: Value) -> Arc<Self> {
        Arc::new(Self {
            plan: Some(plan),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            plan: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PlanProvider for FixedPlan {
    async fn explain(&self, request: &PlanRequest) -> anyhow::Result<QueryPlan> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.statement.starts_with("EXPLAIN (FORMAT JSON) SELECT"));
        assert_eq!(request.params.len(), request.bind_spec.len());
        match &self.plan {
            Some(plan) => Ok(QueryPlan::Json(plan.clone())),
            None => anyhow::bail!("connection refused"),
        }
    }
}

fn explain_config(fail_open: bool) -> IntentqlConfig {
    let mut config = IntentqlConfig::from_yaml(TENANT_CONFIG).unwrap();
    config.explain.enabled = true;
    config.explain.fail_open = fail_open;
    config
}

#[tokio::test]
async fn test_prepare_scopes_rows_to_tenant() {
    let query = tenant_pipeline()
        .prepare(&open_orders(), Some(&alice()), &[])
        .await
        .unwrap();

    assert_eq!(
        query.sql,
        "SELECT * FROM \"orders\" WHERE \"orders\".\"status\" = $1 \
         AND \"orders\".\"tenant_id\" = $2 LIMIT 100"
    );
    assert_eq!(query.bound_values(), vec![json!("open"), json!("acme")]);
}

#[tokio::test]
async fn test_global_table_is_not_scoped() {
    let query = tenant_pipeline()
        .prepare(&QueryIntent::select("countries"), Some(&alice()), &[])
        .await
        .unwrap();
    assert_eq!(query.sql, "SELECT * FROM \"countries\" LIMIT 100");
    assert!(query.params.is_empty());
}

#[tokio::test]
async fn test_missing_tenant_fails_closed() {
    let err = tenant_pipeline()
        .prepare(&open_orders(), Some(&Principal::new("bob")), &[])
        .await
        .unwrap_err();

    match err {
        PipelineError::Validation(e) => assert_eq!(e.kind, ValidationErrorKind::PolicyUnavailable),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_caller_allowlist() {
    let allow = vec!["orders".to_string(), "users".to_string()];
    let err = tenant_pipeline()
        .prepare(&QueryIntent::select("admin_secrets"), Some(&alice()), &allow)
        .await
        .unwrap_err();

    match err {
        PipelineError::Validation(e) => assert_eq!(e.kind, ValidationErrorKind::TableNotAllowed),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_policy_column_allowlist() {
    let mut intent = QueryIntent::select("users");
    intent.columns = vec!["id".to_string(), "password_hash".to_string()];

    let err = tenant_pipeline()
        .prepare(&intent, Some(&alice()), &[])
        .await
        .unwrap_err();
    assert_eq!(err.stage(), "validation");
    assert!(err.to_string().contains("password_hash"));
}

#[tokio::test]
async fn test_not_exists_passes_every_stage() {
    let intent: QueryIntent = serde_json::from_value(json!({
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
    .unwrap();

    let query = Pipeline::from_config(IntentqlConfig::default())
        .unwrap()
        .prepare(&intent, None, &[])
        .await
        .unwrap();

    assert_eq!(
        query.sql,
        "SELECT * FROM \"questions\" WHERE NOT EXISTS (SELECT 1 FROM \"answers\" \
         WHERE \"answers\".\"question_id\" = \"questions\".\"id\" \
         AND \"answers\".\"student_id\" = $1) LIMIT 200"
    );
    assert_eq!(query.bound_values(), vec![json!(17963)]);
}

#[tokio::test]
async fn test_linter_enforces_shape_ceiling_on_explicit_limit() {
    let mut intent = QueryIntent::select("orders");
    intent.columns = vec!["status".to_string()];
    intent.distinct = true;
    intent.limit = Some(5_000);

    let err = Pipeline::from_config(IntentqlConfig::default())
        .unwrap()
        .prepare(&intent, None, &[])
        .await
        .unwrap_err();

    match err {
        PipelineError::Security(e) => assert_eq!(e.kind, ViolationKind::LimitViolation),
        other => panic!("expected security error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_expensive_plan_is_blocked() {
    let provider = FixedPlan::returning(json!([{
        "Plan": {"Node Type": "Seq Scan", "Relation Name": "orders", "Total Cost": 250000.0, "Plan Rows": 10}
    }]));
    let pipeline = Pipeline::from_config(explain_config(true))
        .unwrap()
        .with_plan_provider(provider.clone());

    let err = pipeline
        .prepare(&open_orders(), Some(&alice()), &[])
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "explain");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cheap_plan_passes() {
    let provider = FixedPlan::returning(json!([{
        "Plan": {"Node Type": "Index Scan", "Total Cost": 8.3, "Plan Rows": 1}
    }]));
    let pipeline = Pipeline::from_config(explain_config(false))
        .unwrap()
        .with_plan_provider(provider);

    assert!(pipeline.prepare(&open_orders(), Some(&alice()), &[]).await.is_ok());
}

#[tokio::test]
async fn test_provider_failure_follows_fail_open() {
    let open = Pipeline::from_config(explain_config(true))
        .unwrap()
        .with_plan_provider(FixedPlan::failing());
    assert!(open.prepare(&open_orders(), Some(&alice()), &[]).await.is_ok());

    let closed = Pipeline::from_config(explain_config(false))
        .unwrap()
        .with_plan_provider(FixedPlan::failing());
    let err = closed
        .prepare(&open_orders(), Some(&alice()), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::CostGuard { .. }));
}

#[tokio::test]
async fn test_disabled_gate_skips_provider() {
    let provider = FixedPlan::failing();
    let pipeline = Pipeline::from_config(IntentqlConfig::from_yaml(TENANT_CONFIG).unwrap())
        .unwrap()
        .with_plan_provider(provider.clone());

    assert!(pipeline.prepare(&open_orders(), Some(&alice()), &[]).await.is_ok());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}
