use crate::error::PipelineError;
use intentql_compiler::Compiler;
use intentql_core::{CompiledQuery, IntentqlConfig, Principal, QueryIntent, SqlDialect};
use intentql_guard::{ExplainGate, PlanProvider, SqlLinter};
use intentql_policy::{ConfigPolicy, IntentValidator, PolicyAuthority};
use std::sync::Arc;

/// Validate → compile → lint → explain, for one configuration.
#[derive(Clone)]
pub struct Pipeline {
    config: IntentqlConfig,
    validator: IntentValidator,
    compiler: Compiler,
    linter: SqlLinter,
    explain_gate: Option<ExplainGate>,
}

impl Pipeline {
    /// Build a pipeline that consults `policy`.
    pub fn new(
        config: IntentqlConfig,
        policy: Arc<dyn PolicyAuthority>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let dialect: Arc<dyn SqlDialect> = Arc::new(config.dialect);
        let validator = IntentValidator::new(config.guardrails.clone(), policy.clone());
        let compiler = Compiler::new(dialect.clone(), config.guardrails.clone(), policy);
        let linter = SqlLinter::new(dialect, config.guardrails.clone())?;

        Ok(Self {
            config,
            validator,
            compiler,
            linter,
            explain_gate: None,
        })
    }

    /// Build a pipeline whose policy authority is the config's `policy` section.
    pub fn from_config(config: IntentqlConfig) -> Result<Self, PipelineError> {
        let policy = Arc::new(ConfigPolicy::new(config.policy.clone()));
        Self::new(config, policy)
    }

    /// Check statements against plans from `provider`, using the `explain`
    /// section of the configuration.
    pub fn with_plan_provider(self, provider: Arc<dyn PlanProvider>) -> Self {
        let gate = ExplainGate::new(
            Arc::new(self.config.dialect),
            self.config.explain.clone(),
            provider,
        );
        self.with_explain_gate(gate)
    }

    pub fn with_explain_gate(mut self, gate: ExplainGate) -> Self {
        self.explain_gate = Some(gate);
        self
    }

    pub fn config(&self) -> &IntentqlConfig {
        &self.config
    }

    pub fn validator(&self) -> &IntentValidator {
        &self.validator
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn linter(&self) -> &SqlLinter {
        &self.linter
    }

    /// Turn `intent` into a statement that passed every guardrail.
    ///
    /// An empty `allow_tables` places no caller restriction on the intent;
    /// the linter then only admits the tables the intent names.
    pub async fn prepare(
        &self,
        intent: &QueryIntent,
        user: Option<&Principal>,
        allow_tables: &[String],
    ) -> Result<CompiledQuery, PipelineError> {
        let intent = self.validator.validate(intent, user, allow_tables)?;
        let compiled = self.compiler.compile(&intent, user)?;

        let lint_tables = if allow_tables.is_empty() {
            intent_tables(&intent)
        } else {
            allow_tables.to_vec()
        };
        self.linter.check(&compiled.sql, &lint_tables)?;

        if let Some(gate) = &self.explain_gate
            && !gate.allowed(&compiled).await
        {
            return Err(PipelineError::CostGuard { sql: compiled.sql });
        }

        tracing::info!(
            table = %intent.table,
            params = compiled.bind_spec.len(),
            "statement prepared"
        );
        Ok(compiled)
    }
}

fn intent_tables(intent: &QueryIntent) -> Vec<String> {
    std::iter::once(intent.table.as_str())
        .chain(intent.related_tables())
        .map(str::to_string)
        .collect()
}
