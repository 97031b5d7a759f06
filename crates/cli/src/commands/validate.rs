//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::DaemonBlueprint;
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
    vehicle_fingerprint: String,
    steer_actuator_delay: f64,
    initial_lag: f64,
    pose_frequency_hz: f64,
    estimate_every_frames: u64,
    persist_every_frames: u64,
    params_path: String,
    sink_count: usize,
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
                    vehicle_fingerprint: blueprint.vehicle.fingerprint.clone(),
                    steer_actuator_delay: blueprint.vehicle.steer_actuator_delay,
                    initial_lag: blueprint.initial_lag(),
                    pose_frequency_hz: blueprint.cadence.pose_frequency_hz,
                    estimate_every_frames: blueprint.cadence.estimate_every_frames,
                    persist_every_frames: blueprint.cadence.persist_every_frames,
                    params_path: blueprint.params.path.display().to_string(),
                    sink_count: blueprint.sinks.len(),
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
fn collect_warnings(blueprint: &DaemonBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - estimates will not be published".to_string());
    }

    if !blueprint.params.restore {
        warnings.push("params.restore is false - every run starts from the prior".to_string());
    }

    if blueprint.cadence.debug {
        warnings.push(
            "cadence.debug is true - emitted records carry raw block means".to_string(),
        );
    }

    if blueprint
        .cadence
        .persist_every_frames
        .checked_rem(blueprint.cadence.estimate_every_frames)
        .is_some_and(|r| r != 0)
    {
        warnings.push(
            "persist_every_frames is not a multiple of estimate_every_frames - \
             persistence only happens on emitting frames"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Vehicle: {}", summary.vehicle_fingerprint);
            println!(
                "  Initial lag: {:.3} s (actuator delay {:.3} s)",
                summary.initial_lag, summary.steer_actuator_delay
            );
            println!("  Pose rate: {} Hz", summary.pose_frequency_hz);
            println!(
                "  Cadence: estimate every {}, persist every {} frames",
                summary.estimate_every_frames, summary.persist_every_frames
            );
            println!("  Params: {}", summary.params_path);
            println!("  Sinks: {}", summary.sink_count);
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
