//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// lagd - online lateral actuator-lag estimator
#[derive(Parser, Debug)]
#[command(
    name = "lagd",
    author,
    version,
    about = "Online lateral actuator-lag estimator",
    long_about = "Estimates the delay between commanded and measured lateral motion.\n\n\
                  Consumes vehicle telemetry (a replayed log or a synthetic drive), \n\
                  cross-correlates desired and actual lateral acceleration, and \n\
                  publishes a smoothed lag estimate to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LAGD_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "LAGD_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the estimator over a telemetry source
    Run(RunArgs),

    /// Write a synthetic drive to a telemetry log
    Simulate(SimulateArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "lagd.toml", env = "LAGD_CONFIG")]
    pub config: PathBuf,

    /// Replay a JSONL telemetry log
    #[arg(long, env = "LAGD_REPLAY", conflicts_with = "synthetic")]
    pub replay: Option<PathBuf>,

    /// Generate a synthetic drive instead of reading telemetry
    #[arg(long)]
    pub synthetic: bool,

    #[command(flatten)]
    pub drive: DriveArgs,

    /// Playback speed as a multiple of real time (0 = as fast as possible)
    #[arg(long, default_value = "0", env = "LAGD_REPLAY_SPEED")]
    pub replay_speed: f64,

    /// Override the param store directory
    #[arg(long, env = "LAGD_PARAMS_DIR")]
    pub params_dir: Option<PathBuf>,

    /// Ignore any persisted estimate and start from the prior
    #[arg(long)]
    pub no_restore: bool,

    /// Maximum number of estimates to emit (0 = unlimited)
    #[arg(long, default_value = "0", env = "LAGD_MAX_FRAMES")]
    pub max_frames: u64,

    /// Pipeline timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "LAGD_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "LAGD_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Synthetic drive shape, shared by `run --synthetic` and `simulate`
#[derive(Args, Debug, Clone)]
pub struct DriveArgs {
    /// Drive length in seconds
    #[arg(long, default_value = "300")]
    pub duration: f64,

    /// Delay between commanded curvature and measured yaw rate (s)
    #[arg(long, default_value = "0.3")]
    pub true_delay: f64,

    /// Vehicle speed (m/s)
    #[arg(long, default_value = "20")]
    pub v_ego: f64,

    /// Uniform yaw-rate noise half-width (rad/s)
    #[arg(long, default_value = "0")]
    pub noise: f64,

    /// Inject a one-second driver override every N seconds
    #[arg(long)]
    pub override_every: Option<f64>,

    /// RNG seed
    #[arg(long, default_value = "42")]
    pub seed: u64,
}

/// Arguments for the `simulate` command
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Output telemetry log (JSON lines)
    #[arg(short, long, default_value = "drive.jsonl")]
    pub output: PathBuf,

    /// Pose rate (Hz)
    #[arg(long, default_value = "20")]
    pub frequency: f64,

    #[command(flatten)]
    pub drive: DriveArgs,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "lagd.toml", env = "LAGD_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "lagd.toml", env = "LAGD_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show estimator tuning
    #[arg(long)]
    pub estimator: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
