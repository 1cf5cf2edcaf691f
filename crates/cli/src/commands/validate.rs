//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{IngestConfig, TransportKind};
use serde::Serialize;
use tracing::info;

use super::load_config;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    mode: String,
    workers: usize,
    topic: String,
    transport: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    let config_path = args
        .config
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<defaults>".to_string());
    info!(config = %config_path, "Validating configuration");

    let result = match load_config(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    mode: config.pipeline.mode.to_string(),
                    workers: config.pipeline.worker_count,
                    topic: config.broker.topic.clone(),
                    transport: format!("{:?}", config.broker.transport),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    };

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &IngestConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.source.csv_path.is_none() {
        warnings.push("source.csv_path is not set - `run` needs --csv".to_string());
    }

    if config.broker.transport == TransportKind::Memory {
        warnings.push("memory transport keeps delivered messages in process only".to_string());
    }

    if config.source.session_id.is_none() {
        warnings.push("source.session_id is not set - a new one is generated per run".to_string());
    }

    if config.pipeline.queue_capacity < config.pipeline.worker_count {
        warnings.push("queue_capacity is smaller than worker_count - workers will idle".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Mode: {}", summary.mode);
            println!("  Workers: {}", summary.workers);
            println!("  Topic: {}", summary.topic);
            println!("  Transport: {}", summary.transport);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_for_defaults() {
        let warnings = collect_warnings(&IngestConfig::default());
        assert!(warnings.iter().any(|w| w.contains("csv_path")));
        assert!(warnings.iter().any(|w| w.contains("session_id")));
    }
}
