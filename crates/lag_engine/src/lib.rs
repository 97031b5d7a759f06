//! # Lag Engine
//!
//! Online estimator of the lateral actuator delay.
//!
//! Responsibilities:
//! - Gate and buffer lateral acceleration samples
//! - Masked normalized cross-correlation over the sample window
//! - Block-averaged delay estimate with warm-start support
//! - Pose-polled frame assembly and emission cadence
//!
//! ## Usage
//!
//! ```ignore
//! use lag_engine::LagDaemon;
//!
//! let mut daemon = LagDaemon::new(&blueprint);
//! daemon.warm_start(persisted.as_deref());
//!
//! for msg in telemetry {
//!     if let Some(step) = daemon.process(msg)? {
//!         publish(step.frame);
//!     }
//! }
//! ```

mod block_average;
mod buffer;
mod calibration;
mod correlation;
mod daemon;
mod estimator;
mod mux;
mod restore;

pub use block_average::BlockAverage;
pub use buffer::{Sample, SampleBuffer, SampleWindow};
pub use calibration::{CalibratedPose, PoseCalibrator};
pub use correlation::{fft_next_good_size, parabolic_peak_interp, CorrelationPeak, CrossCorrelator};
pub use daemon::{DaemonStep, LagDaemon};
pub use estimator::{EstimateOutcome, LagEstimator};
pub use mux::{AssembledFrame, TelemetryMux};
pub use restore::{retrieve_initial_lag, RestoredLag};

// Re-export contracts types
pub use contracts::{LagEstimatorConfig, LiveDelay, LiveDelayFrame, PersistedDelay};
