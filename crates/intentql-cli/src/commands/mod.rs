//! `intentql` subcommands.
//!
//! Each command returns a [`Report`]: the JSON document printed on stdout
//! and whether the request was accepted.

pub mod compile;
pub mod config;
pub mod lint;
pub mod prepare;

use anyhow::{Context, Result};
use intentql_core::{IntentqlConfig, Principal};
use intentql_runtime::PipelineError;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "intentql.yaml";

pub struct Report {
    pub ok: bool,
    pub body: Value,
}

impl Report {
    pub fn accepted(body: Value) -> Self {
        Self { ok: true, body }
    }

    pub fn rejected(body: Value) -> Self {
        Self { ok: false, body }
    }

    pub(crate) fn pipeline_error(err: &PipelineError) -> Self {
        let mut body = json!({
            "ok": false,
            "stage": err.stage(),
            "error": err.to_string(),
        });
        if let PipelineError::Security(e) = err {
            body["kind"] = json!(e.kind.to_string());
        }
        Self::rejected(body)
    }
}

/// Load the configuration from `path`, or from `intentql.yaml` in the
/// working directory, or fall back to the defaults.
pub fn load_config(path: Option<&Path>) -> Result<IntentqlConfig> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
        None => {
            tracing::debug!("no configuration file, using defaults");
            return Ok(IntentqlConfig::default());
        }
    };
    IntentqlConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub(crate) fn read_principal(path: Option<&Path>) -> Result<Option<Principal>> {
    path.map(read_json::<Principal>).transpose()
}
