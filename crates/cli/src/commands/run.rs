//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{DaemonBlueprint, DropPolicy};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig, TelemetryInput};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(ref dir) = args.params_dir {
        info!(path = %dir.display(), "Overriding param store directory from CLI");
        blueprint.params.path = dir.clone();
    }
    if args.no_restore {
        blueprint.params.restore = false;
    }
    config_loader::ConfigLoader::validate(&blueprint).context("Invalid configuration after CLI overrides")?;

    info!(
        vehicle = %blueprint.vehicle.fingerprint,
        initial_lag = blueprint.initial_lag(),
        pose_frequency_hz = blueprint.cadence.pose_frequency_hz,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    let input = select_input(args, &blueprint)?;

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint, &input);
        return Ok(());
    }

    let speed = (args.replay_speed > 0.0).then_some(args.replay_speed);
    if speed.is_none()
        && matches!(input, TelemetryInput::Replay { .. })
        && blueprint.ingestion.drop_policy != DropPolicy::Block
    {
        warn!("Unpaced replay with a dropping policy may discard telemetry under load");
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        input,
        speed,
        max_frames: (args.max_frames > 0).then_some(args.max_frames),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(setup_shutdown_signal())
        .await
        .map_err(|e| CliError::pipeline_execution(format!("{e:#}")))?;

    info!(
        messages = stats.messages_received,
        estimates = stats.delay_metrics.total_frames,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("lagd finished");
    Ok(())
}

fn select_input(args: &RunArgs, blueprint: &DaemonBlueprint) -> Result<TelemetryInput, CliError> {
    match (&args.replay, args.synthetic) {
        (Some(path), _) => {
            if !path.exists() {
                return Err(CliError::source(format!(
                    "telemetry log not found: {}",
                    path.display()
                )));
            }
            Ok(TelemetryInput::Replay { path: path.clone() })
        }
        (None, true) => Ok(TelemetryInput::Synthetic {
            drive: args.drive.to_config(blueprint.cadence.pose_frequency_hz),
        }),
        (None, false) => Err(CliError::source(
            "no telemetry source; pass --replay <FILE> or --synthetic",
        )),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &DaemonBlueprint, input: &TelemetryInput) {
    println!("\n=== Configuration Summary ===\n");
    println!("Vehicle:");
    println!("  Fingerprint: {}", blueprint.vehicle.fingerprint);
    println!(
        "  Steer actuator delay: {:.3} s",
        blueprint.vehicle.steer_actuator_delay
    );
    println!("  Initial lag: {:.3} s", blueprint.initial_lag());

    println!("\nCadence:");
    println!("  Pose rate: {} Hz", blueprint.cadence.pose_frequency_hz);
    println!(
        "  Estimate every {} frames, persist every {} frames",
        blueprint.cadence.estimate_every_frames, blueprint.cadence.persist_every_frames
    );

    println!("\nInput:");
    match input {
        TelemetryInput::Replay { path } => println!("  Replay: {}", path.display()),
        TelemetryInput::Synthetic { drive } => println!(
            "  Synthetic: {} s at {} m/s, true delay {} s",
            drive.duration_sec, drive.v_ego, drive.true_delay
        ),
    }

    println!("\nParams:");
    println!("  Path: {}", blueprint.params.path.display());
    println!("  Restore: {}", blueprint.params.restore);

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
