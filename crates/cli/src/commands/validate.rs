//! `validate` command implementation.

use anyhow::{Context, Result};
use barriers::{BatchingBarrier, ConnectivityBarrier};
use contracts::{ConnectivityMode, SdkBlueprint};
use serde::Serialize;
use tracing::info;

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
    store_path: String,
    max_queue_size: i64,
    dispatcher_count: usize,
    barrier_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

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

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    store_path: blueprint.store.path.display().to_string(),
                    max_queue_size: blueprint.store.max_queue_size,
                    dispatcher_count: blueprint.dispatchers.len(),
                    barrier_count: blueprint.barriers.len(),
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
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &SdkBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.dispatchers.is_empty() {
        warnings.push("No dispatchers configured - tracked events will be dropped".to_string());
    }

    if blueprint.store.max_queue_size == -1 {
        warnings.push("store.max_queue_size is -1 - the queue is unbounded".to_string());
    }

    for barrier in &blueprint.barriers {
        match barrier.id.as_str() {
            BatchingBarrier::ID => {
                let batch_size = barrier
                    .configuration
                    .get(BatchingBarrier::KEY_BATCH_SIZE)
                    .and_then(|v| v.as_i64());
                if let Some(size) = batch_size {
                    if blueprint.store.max_queue_size != -1 && size > blueprint.store.max_queue_size
                    {
                        warnings.push(format!(
                            "BatchingBarrier batch_size {} exceeds store.max_queue_size {}",
                            size, blueprint.store.max_queue_size
                        ));
                    }
                }
            }
            ConnectivityBarrier::ID => {
                let wifi_only = barrier
                    .configuration
                    .get(ConnectivityBarrier::KEY_WIFI_ONLY)
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if wifi_only && blueprint.connectivity.mode == ConnectivityMode::Always {
                    warnings.push(
                        "ConnectivityBarrier wifi_only has no effect with connectivity mode 'always'"
                            .to_string(),
                    );
                }
            }
            other => warnings.push(format!(
                "Barrier '{}' is not built in - its settings apply only once it is registered",
                other
            )),
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Store: {}", summary.store_path);
            println!("  Max queue size: {}", summary.max_queue_size);
            println!("  Dispatchers: {}", summary.dispatcher_count);
            println!("  Barrier settings: {}", summary.barrier_count);
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
