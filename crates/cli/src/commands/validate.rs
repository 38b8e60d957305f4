//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{SafetyConfig, SinkType};

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
    camera_id: String,
    lane_count: usize,
    sink_count: usize,
    enabled_sinks: usize,
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
                    camera_id: config.source.camera_id.clone(),
                    lane_count: config.lane.lane_count(),
                    sink_count: config.sinks.len(),
                    enabled_sinks: config.sinks.iter().filter(|s| s.enabled).count(),
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
fn collect_warnings(config: &SafetyConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    let enabled: Vec<_> = config.sinks.iter().filter(|s| s.enabled).collect();
    if enabled.is_empty() {
        warnings.push("No enabled sinks - events will be published to nobody".to_string());
    } else if !enabled.iter().any(|s| s.sink_type == SinkType::File) {
        warnings.push("No enabled file sink - events will not be persisted".to_string());
    }

    if config.emergency.min_confidence <= config.tracker.min_confidence {
        warnings.push(format!(
            "emergency.min_confidence ({}) is not above tracker.min_confidence ({}) - the gate has no effect",
            config.emergency.min_confidence, config.tracker.min_confidence
        ));
    }

    if config.lane.recovery_frames == 0 {
        warnings.push(
            "lane.recovery_frames is 0 - a violation re-arms on the first conforming frame"
                .to_string(),
        );
    }

    if config.tracker.confirm_hits > config.lane.violation_frames {
        warnings.push(format!(
            "tracker.confirm_hits ({}) exceeds lane.violation_frames ({}) - detection latency is dominated by confirmation",
            config.tracker.confirm_hits, config.lane.violation_frames
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Camera: {}", summary.camera_id);
            println!("  Lanes: {}", summary.lane_count);
            println!("  Sinks: {} ({} enabled)", summary.sink_count, summary.enabled_sinks);
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
