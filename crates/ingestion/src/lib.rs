//! # Ingestion Pipeline
//!
//! Telemetry ingestion for the lag daemon.
//!
//! Responsibilities:
//! - Register telemetry sources (log replay, synthetic drives)
//! - Decode JSONL telemetry into `TelemetryMessage`
//! - Backpressure management and drop policy
//! - Send to downstream via async-channel
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{IngestionPipeline, ReplayPacing, ReplaySource};
//!
//! let mut pipeline = IngestionPipeline::new(1024);
//! let source = ReplaySource::open("drive.jsonl", ReplayPacing::Unpaced)?
//!     .with_metrics(pipeline.metrics());
//! pipeline.register_source(Box::new(source))?;
//!
//! let rx = pipeline.take_receiver().unwrap();
//! pipeline.start_all();
//! while let Ok(msg) = rx.recv().await {
//!     // Feed the daemon
//! }
//! ```

mod config;
mod error;
mod pipeline;
mod replay;
mod synthetic;

pub use config::{BackpressureConfig, DropPolicy, IngestionMetrics, MetricsSnapshot};
pub use contracts::TelemetryMessage;
pub use error::{IngestionError, Result};
pub use pipeline::IngestionPipeline;
pub use replay::{
    decode_line, read_telemetry_log, write_telemetry_log, ReplayPacing, ReplaySource, ReplayStats,
};
pub use synthetic::{SyntheticDrive, SyntheticDriveConfig, SyntheticSource};
