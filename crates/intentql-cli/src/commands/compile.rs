//! `intentql compile`: validate an intent and print the statement it
//! compiles to, without linting or explaining it.

use super::{Report, read_json, read_principal};
use anyhow::Result;
use intentql_core::{CompiledQuery, QueryIntent};
use intentql_runtime::{Pipeline, PipelineError};
use serde_json::{Value, json};
use std::path::Path;

pub fn run(pipeline: &Pipeline, intent_path: &Path, user_path: Option<&Path>) -> Result<Report> {
    let intent: QueryIntent = read_json(intent_path)?;
    let user = read_principal(user_path)?;

    let compiled = pipeline
        .validator()
        .validate(&intent, user.as_ref(), &[])
        .map_err(PipelineError::from)
        .and_then(|validated| {
            pipeline
                .compiler()
                .compile(&validated, user.as_ref())
                .map_err(PipelineError::from)
        });

    Ok(match compiled {
        Ok(query) => Report::accepted(statement_json(&query)),
        Err(e) => Report::pipeline_error(&e),
    })
}

pub(crate) fn statement_json(query: &CompiledQuery) -> Value {
    json!({
        "ok": true,
        "sql": query.sql,
        "params": query.params,
        "bind_spec": query.bind_spec,
        "values": query.bound_values(),
    })
}
