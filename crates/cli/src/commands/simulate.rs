//! `simulate` command implementation.

use anyhow::{Context, Result};
use ingestion::{SyntheticDrive, SyntheticDriveConfig};
use tracing::info;

use crate::cli::{DriveArgs, SimulateArgs};

impl DriveArgs {
    /// Drive configuration at the given pose rate
    pub fn to_config(&self, pose_frequency_hz: f64) -> SyntheticDriveConfig {
        SyntheticDriveConfig {
            duration_sec: self.duration,
            pose_frequency_hz,
            v_ego: self.v_ego,
            true_delay: self.true_delay,
            noise: self.noise,
            override_every_sec: self.override_every,
            seed: self.seed,
            ..Default::default()
        }
    }
}

/// Execute the `simulate` command
pub fn run_simulate(args: &SimulateArgs) -> Result<()> {
    if !(args.frequency.is_finite() && args.frequency > 0.0) {
        anyhow::bail!("Pose frequency must be positive, got {}", args.frequency);
    }

    let drive = SyntheticDrive::new(args.drive.to_config(args.frequency));
    info!(
        duration_sec = drive.config().duration_sec,
        true_delay = drive.config().true_delay,
        ticks = drive.config().ticks(),
        "Generating synthetic drive"
    );

    let messages: Vec<_> = drive.messages().collect();
    let written = ingestion::write_telemetry_log(&args.output, &messages)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!(path = %args.output.display(), messages = written, "Telemetry log written");
    println!("Wrote {} messages to {}", written, args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn drive_args(duration: f64) -> DriveArgs {
        DriveArgs {
            duration,
            true_delay: 0.2,
            v_ego: 15.0,
            noise: 0.0,
            override_every: Some(30.0),
            seed: 7,
        }
    }

    #[test]
    fn test_drive_args_to_config() {
        let config = drive_args(60.0).to_config(10.0);
        assert_eq!(config.pose_frequency_hz, 10.0);
        assert_eq!(config.true_delay, 0.2);
        assert_eq!(config.override_every_sec, Some(30.0));
        assert_eq!(config.seed, 7);
        assert_eq!(config.ticks(), 600);
    }

    #[test]
    fn test_simulate_writes_log() {
        let dir = TempDir::new().unwrap();
        let args = SimulateArgs {
            output: dir.path().join("drive.jsonl"),
            frequency: 20.0,
            drive: drive_args(1.0),
        };
        run_simulate(&args).unwrap();

        let (messages, stats) = ingestion::read_telemetry_log(&args.output).unwrap();
        // 20 ticks of 4 kinds plus one calibration
        assert_eq!(messages.len(), 81);
        assert_eq!(stats.decode_errors, 0);
    }

    #[test]
    fn test_simulate_rejects_zero_frequency() {
        let dir = TempDir::new().unwrap();
        let args = SimulateArgs {
            output: dir.path().join("drive.jsonl"),
            frequency: 0.0,
            drive: drive_args(1.0),
        };
        assert!(run_simulate(&args).is_err());
    }
}
