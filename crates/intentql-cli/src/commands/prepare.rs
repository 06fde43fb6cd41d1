//! `intentql prepare`: run an intent through the whole pipeline.

use super::compile::statement_json;
use super::{Report, read_json, read_principal};
use anyhow::{Context, Result};
use intentql_adapter_pg::{PgPlanProvider, PgPlanProviderOptions};
use intentql_core::{IntentqlConfig, QueryIntent};
use intentql_runtime::Pipeline;
use std::path::Path;
use std::sync::Arc;

pub struct PrepareArgs<'a> {
    pub intent: &'a Path,
    pub user: Option<&'a Path>,
    pub allow_tables: &'a [String],
    /// Enables the explain gate against this database.
    pub database_url: Option<&'a str>,
}

pub async fn run(mut config: IntentqlConfig, args: PrepareArgs<'_>) -> Result<Report> {
    let intent: QueryIntent = read_json(args.intent)?;
    let user = read_principal(args.user)?;

    let provider = match args.database_url {
        Some(url) => {
            config.explain.enabled = true;
            let provider = PgPlanProvider::connect(url, PgPlanProviderOptions::default())
                .await
                .context("Failed to connect to the plan database")?;
            Some(Arc::new(provider))
        }
        None => None,
    };

    let mut pipeline = Pipeline::from_config(config)?;
    if let Some(provider) = provider {
        pipeline = pipeline.with_plan_provider(provider);
    }

    Ok(
        match pipeline.prepare(&intent, user.as_ref(), args.allow_tables).await {
            Ok(query) => Report::accepted(statement_json(&query)),
            Err(e) => Report::pipeline_error(&e),
        },
    )
}
