//! `intentql config check`: load the configuration and build every stage
//! from it, printing the effective settings.

use super::{Report, load_config};
use anyhow::Result;
use intentql_runtime::Pipeline;
use serde_json::json;
use std::path::Path;

pub fn check(path: Option<&Path>) -> Result<Report> {
    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            return Ok(Report::rejected(json!({
                "ok": false,
                "stage": "config",
                "error": format!("{e:#}"),
            })));
        }
    };

    let effective = serde_json::to_value(&config)?;
    Ok(match Pipeline::from_config(config) {
        Ok(_) => Report::accepted(json!({ "ok": true, "config": effective })),
        Err(e) => Report::pipeline_error(&e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn yaml_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_valid_config() {
        let file = yaml_file("dialect: sqlite\nguardrails:\n  max_joins: 1\n");
        let report = check(Some(file.path())).unwrap();

        assert!(report.ok);
        assert_eq!(report.body["config"]["dialect"], json!("sqlite"));
        assert_eq!(report.body["config"]["guardrails"]["max_joins"], json!(1));
    }

    #[test]
    fn test_inconsistent_config() {
        let file = yaml_file("guardrails:\n  max_limit: 10\n  default_limit: 20\n");
        let report = check(Some(file.path())).unwrap();

        assert!(!report.ok);
        assert_eq!(report.body["stage"], json!("config"));
        assert!(report.body["error"].as_str().unwrap().contains("default_limit"));
    }
}
