//! PostgreSQL plan provider.
//!
//! Runs the gate's `EXPLAIN (FORMAT JSON)` statement with the compiled
//! query's values bound positionally. Placeholders are cast to the type of
//! the column named by the bind spec. Nothing is executed beyond EXPLAIN
//! (no `ANALYZE`).

mod bind;
mod types;

use async_trait::async_trait;
use intentql_core::PlanFormat;
use intentql_guard::{PlanProvider, PlanRequest, QueryPlan};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use types::ColumnTypes;

#[derive(Debug, Clone, Copy)]
pub struct PgPlanProviderOptions {
    pub max_connections: u32,
}

impl Default for PgPlanProviderOptions {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

pub struct PgPlanProvider {
    pool: PgPool,
    column_types: ColumnTypes,
}

impl PgPlanProvider {
    pub async fn connect(
        database_url: &str,
        options: PgPlanProviderOptions,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::from_pool(pool))
    }

    /// Use an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            column_types: ColumnTypes::default(),
        }
    }
}

#[async_trait]
impl PlanProvider for PgPlanProvider {
    async fn explain(&self, request: &PlanRequest) -> anyhow::Result<QueryPlan> {
        if request.format != PlanFormat::JsonTree {
            anyhow::bail!(
                "Postgres plan provider only produces JSON plans, got a {:?} request",
                request.format
            );
        }

        let targets = self
            .column_types
            .resolve(&self.pool, &request.bind_spec)
            .await?;
        let statement = types::typed_statement(&request.statement, &targets);

        let args = bind::arguments(&request.params)?;
        let row = sqlx::query_with(&statement, args)
            .fetch_one(&self.pool)
            .await?;
        let plan: sqlx::types::Json<Value> = row.try_get(0)?;

        tracing::debug!(sql = %request.sql, "plan fetched");
        Ok(QueryPlan::Json(plan.0))
    }
}
