//! Preflight checks.
//!
//! Verifies, before any analysis runs, that the configuration is valid, the
//! model server answers and the default model is installed.

use crate::config::EngineConfig;
use crate::llm::{ModelInfo, OllamaClient};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

/// Result of a single check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Complete preflight check report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    pub all_passed: bool,
    pub checks: Vec<CheckResult>,
    pub model_server_url: String,
    pub default_model: String,
    /// Models installed on the server; empty when it could not be reached.
    pub models: Vec<ModelInfo>,
    pub summary: String,
}

/// Runs every check against `client` and returns the report. Never fails.
pub async fn run_preflight_checks(config: &EngineConfig, client: &OllamaClient) -> PreflightReport {
    info!("Running preflight checks against {}", client.base_url());

    let mut checks = vec![check_config(config)];

    let models = match client.list_models().await {
        Ok(models) => {
            checks.push(CheckResult::pass(
                "model_server",
                &format!("Model server reachable ({} models installed)", models.len()),
            ));
            models
        }
        Err(e) => {
            checks.push(CheckResult::fail(
                "model_server",
                "Model server unreachable",
                Some(e.to_string()),
            ));
            Vec::new()
        }
    };

    let server_up = checks.iter().any(|c| c.name == "model_server" && c.passed);
    if server_up {
        checks.push(check_default_model(&config.default_model, &models));
    } else {
        checks.push(CheckResult::fail(
            "default_model",
            "Skipped - model server unreachable",
            None,
        ));
    }

    let all_passed = checks.iter().all(|c| c.passed);
    let summary = if all_passed {
        "All checks passed. Ready to analyze.".to_string()
    } else if !server_up {
        format!("Start the model server at {} (e.g. `ollama serve`).", client.base_url())
    } else {
        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect();
        format!("Checks failed: {}", failed.join(", "))
    };

    for check in &checks {
        if check.passed {
            info!("  ok   {}: {}", check.name, check.message);
        } else {
            warn!("  FAIL {}: {}", check.name, check.message);
            if let Some(details) = &check.details {
                warn!("       Details: {}", details);
            }
        }
    }
    info!("Summary: {}", summary);

    PreflightReport {
        all_passed,
        checks,
        model_server_url: client.base_url().to_string(),
        default_model: config.default_model.clone(),
        models,
        summary,
    }
}

// --- Individual Checks ---

fn check_config(config: &EngineConfig) -> CheckResult {
    match config.validate() {
        Ok(()) => CheckResult::pass("config", "Configuration valid"),
        Err(e) => CheckResult::fail("config", "Configuration invalid", Some(e.to_string())),
    }
}

fn check_default_model(default_model: &str, models: &[ModelInfo]) -> CheckResult {
    match models.iter().find(|m| m.matches(default_model)) {
        Some(found) => CheckResult::pass(
            "default_model",
            &format!("Default model '{}' installed as '{}'", default_model, found.name),
        ),
        None => CheckResult::fail(
            "default_model",
            &format!("Default model '{}' is not installed", default_model),
            Some(format!("Run `ollama pull {}`", default_model)),
        ),
    }
}
