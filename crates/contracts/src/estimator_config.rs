//! Estimator and cadence configuration contracts shared across crates.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lag estimator tuning
///
/// Every field has a default, so an empty `[estimator]` table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LagEstimatorConfig {
    /// Accepted estimates folded into one block
    #[validate(range(min = 1))]
    pub block_size: usize,

    /// Blocks kept in the ring
    #[validate(range(min = 1))]
    pub block_count: usize,

    /// Completed blocks required before status becomes `estimated`
    #[validate(range(min = 1))]
    pub min_valid_blocks: usize,

    /// Sliding sample window length (seconds)
    #[validate(range(exclusive_min = 0.0))]
    pub window_sec: f64,

    /// Okay samples required in the window (seconds)
    #[validate(range(exclusive_min = 0.0))]
    pub okay_window_sec: f64,

    /// Settle time after disengagement, override or saturation (seconds)
    #[validate(range(min = 0.0))]
    pub min_recovery_buffer_sec: f64,

    /// Minimum speed for okay samples (m/s, strict)
    #[validate(range(min = 0.0))]
    pub min_vego: f64,

    /// Minimum absolute yaw rate for okay samples (rad/s)
    #[validate(range(min = 0.0))]
    pub min_yaw_rate: f64,

    /// Minimum correlation to accept an estimate
    #[validate(range(min = -1.0, max = 1.0))]
    pub min_ncc: f64,

    /// Largest lag searched (seconds)
    #[validate(range(exclusive_min = 0.0))]
    pub max_lag: f64,

    /// Added to the vehicle's actuator delay to form the prior
    #[validate(range(min = 0.0))]
    pub initial_lag_margin: f64,
}

impl Default for LagEstimatorConfig {
    fn default() -> Self {
        Self {
            block_size: 100,
            block_count: 50,
            min_valid_blocks: 5,
            window_sec: 300.0,
            okay_window_sec: 25.0,
            min_recovery_buffer_sec: 2.0,
            min_vego: 15.0,
            min_yaw_rate: 1.0_f64.to_radians(),
            min_ncc: 0.95,
            max_lag: 1.0,
            initial_lag_margin: 0.2,
        }
    }
}

impl LagEstimatorConfig {
    /// Prior delay for a vehicle with the given actuator delay
    pub fn initial_lag(&self, steer_actuator_delay: f64) -> f64 {
        steer_actuator_delay + self.initial_lag_margin
    }

    /// Sample window capacity at sample period `dt`
    pub fn window_len(&self, dt: f64) -> usize {
        (self.window_sec / dt) as usize
    }

    /// Okay samples needed at sample period `dt`
    pub fn okay_window_len(&self, dt: f64) -> usize {
        (self.okay_window_sec / dt) as usize
    }

    /// Lag search range in samples at sample period `dt`
    pub fn max_lag_samples(&self, dt: f64) -> usize {
        (self.max_lag / dt) as usize
    }
}

/// Daemon loop cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CadenceConfig {
    /// Pose rate driving the loop (Hz); sample period is its inverse
    #[validate(range(exclusive_min = 0.0))]
    pub pose_frequency_hz: f64,

    /// Run the estimate and emit every N pose frames
    #[validate(range(min = 1))]
    pub estimate_every_frames: u64,

    /// Persist the emitted record every N pose frames
    #[validate(range(min = 1))]
    pub persist_every_frames: u64,

    /// A kind not seen for this long fails the frame checks (seconds)
    #[validate(range(exclusive_min = 0.0))]
    pub stale_after_sec: f64,

    /// Include raw block means in emitted records
    pub debug: bool,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            pose_frequency_hz: 20.0,
            estimate_every_frames: 5,
            persist_every_frames: 1200,
            stale_after_sec: 2.0,
            debug: false,
        }
    }
}

impl CadenceConfig {
    /// Sample period (seconds)
    pub fn dt(&self) -> f64 {
        1.0 / self.pose_frequency_hz
    }
}
