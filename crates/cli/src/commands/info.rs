//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{DaemonBlueprint, LagEstimatorConfig};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    vehicle: VehicleInfo,
    cadence: CadenceInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimator: Option<LagEstimatorConfig>,
    ingestion: IngestionInfo,
    params: ParamsInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct VehicleInfo {
    fingerprint: String,
    steer_actuator_delay: f64,
    initial_lag: f64,
}

#[derive(Serialize)]
struct CadenceInfo {
    pose_frequency_hz: f64,
    sample_period_sec: f64,
    estimate_every_frames: u64,
    persist_every_frames: u64,
    stale_after_sec: f64,
    debug: bool,
}

#[derive(Serialize)]
struct IngestionInfo {
    channel_capacity: usize,
    drop_policy: String,
}

#[derive(Serialize)]
struct ParamsInfo {
    path: String,
    restore: bool,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &DaemonBlueprint, args: &InfoArgs) -> ConfigInfo {
    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let cadence = &blueprint.cadence;
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        vehicle: VehicleInfo {
            fingerprint: blueprint.vehicle.fingerprint.clone(),
            steer_actuator_delay: blueprint.vehicle.steer_actuator_delay,
            initial_lag: blueprint.initial_lag(),
        },
        cadence: CadenceInfo {
            pose_frequency_hz: cadence.pose_frequency_hz,
            sample_period_sec: blueprint.sample_period(),
            estimate_every_frames: cadence.estimate_every_frames,
            persist_every_frames: cadence.persist_every_frames,
            stale_after_sec: cadence.stale_after_sec,
            debug: cadence.debug,
        },
        estimator: args.estimator.then(|| blueprint.estimator.clone()),
        ingestion: IngestionInfo {
            channel_capacity: blueprint.ingestion.channel_capacity,
            drop_policy: format!("{:?}", blueprint.ingestion.drop_policy),
        },
        params: ParamsInfo {
            path: blueprint.params.path.display().to_string(),
            restore: blueprint.params.restore,
        },
        sinks,
    }
}

fn print_config_info(blueprint: &DaemonBlueprint, args: &InfoArgs) {
    println!("=== lagd Configuration ===\n");

    println!("Vehicle");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Fingerprint: {}", blueprint.vehicle.fingerprint);
    println!(
        "   ├─ Steer actuator delay: {:.3} s",
        blueprint.vehicle.steer_actuator_delay
    );
    println!("   └─ Initial lag: {:.3} s", blueprint.initial_lag());

    let cadence = &blueprint.cadence;
    println!("\nCadence");
    println!(
        "   ├─ Pose rate: {} Hz (dt {:.3} s)",
        cadence.pose_frequency_hz,
        blueprint.sample_period()
    );
    println!("   ├─ Estimate every: {} frames", cadence.estimate_every_frames);
    println!("   ├─ Persist every: {} frames", cadence.persist_every_frames);
    println!("   ├─ Stale after: {} s", cadence.stale_after_sec);
    println!("   └─ Debug: {}", cadence.debug);

    if args.estimator {
        let e = &blueprint.estimator;
        println!("\nEstimator");
        println!("   ├─ Blocks: {} x {} estimates", e.block_count, e.block_size);
        println!("   ├─ Min valid blocks: {}", e.min_valid_blocks);
        println!(
            "   ├─ Window: {} s ({} s okay)",
            e.window_sec, e.okay_window_sec
        );
        println!("   ├─ Recovery buffer: {} s", e.min_recovery_buffer_sec);
        println!(
            "   ├─ Gates: v_ego > {} m/s, |yaw rate| >= {} rad/s",
            e.min_vego, e.min_yaw_rate
        );
        println!("   ├─ Min NCC: {}", e.min_ncc);
        println!("   └─ Max lag: {} s", e.max_lag);
    }

    println!("\nIngestion");
    println!(
        "   ├─ Channel capacity: {}",
        blueprint.ingestion.channel_capacity
    );
    println!("   └─ Drop policy: {:?}", blueprint.ingestion.drop_policy);

    println!("\nParams");
    println!("   ├─ Path: {}", blueprint.params.path.display());
    println!("   └─ Restore: {}", blueprint.params.restore);

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let is_last = i == blueprint.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            if args.sinks {
                println!(
                    "   {} {} ({:?}, queue {}) {:?}",
                    prefix, sink.name, sink.sink_type, sink.queue_capacity, sink.params
                );
            } else {
                println!("   {} {} ({:?})", prefix, sink.name, sink.sink_type);
            }
        }
    }

    println!();
}
