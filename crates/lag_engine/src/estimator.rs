//! Lateral lag estimator.
//!
//! Latches the most recent telemetry fields, turns them into gated lateral
//! acceleration samples, and periodically correlates the desired and actual
//! channels to fold new lag estimates into a block average.

use std::fmt;

use contracts::{
    ContractError, DelayStatus, LagEstimatorConfig, LiveDelay, TelemetryPayload,
};
use metrics::{counter, histogram};
use tracing::{debug, instrument, trace};

use crate::block_average::BlockAverage;
use crate::buffer::{SampleBuffer, SampleWindow};
use crate::calibration::PoseCalibrator;
use crate::correlation::CrossCorrelator;

/// Result of one `update_estimate` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimateOutcome {
    /// Window shorter than the okay window
    NotEnoughPoints,
    /// Too few okay samples in the window
    InsufficientOkay { num_okay: usize, required: usize },
    /// No okay sample arrived since the last accepted estimate
    NoNewData,
    /// Correlation peak below the acceptance threshold
    LowCorrelation { lag: f64, confidence: f64 },
    /// Estimate folded into the block average
    Accepted { lag: f64, confidence: f64 },
}

impl EstimateOutcome {
    /// Label used for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimateOutcome::NotEnoughPoints => "not_enough_points",
            EstimateOutcome::InsufficientOkay { .. } => "insufficient_okay",
            EstimateOutcome::NoNewData => "no_new_data",
            EstimateOutcome::LowCorrelation { .. } => "low_correlation",
            EstimateOutcome::Accepted { .. } => "accepted",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, EstimateOutcome::Accepted { .. })
    }

    /// Correlation confidence, if a correlation ran
    pub fn confidence(&self) -> Option<f64> {
        match self {
            EstimateOutcome::LowCorrelation { confidence, .. }
            | EstimateOutcome::Accepted { confidence, .. } => Some(*confidence),
            _ => None,
        }
    }
}

/// Online lateral actuator-lag estimator
pub struct LagEstimator {
    config: LagEstimatorConfig,
    dt: f64,
    initial_lag: f64,

    t: f64,
    lat_active: bool,
    steering_pressed: bool,
    steering_saturated: bool,
    desired_curvature: f64,
    v_ego: f64,
    yaw_rate: f64,

    last_lat_inactive_t: f64,
    last_steering_pressed_t: f64,
    last_steering_saturated_t: f64,
    last_estimate_t: Option<f64>,

    calibrator: PoseCalibrator,
    points: SampleBuffer,
    block_avg: BlockAverage,
    correlator: CrossCorrelator,
}

impl fmt::Debug for LagEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LagEstimator")
            .field("t", &self.t)
            .field("dt", &self.dt)
            .field("initial_lag", &self.initial_lag)
            .field("num_okay", &self.points.num_okay())
            .field("valid_blocks", &self.block_avg.valid_blocks())
            .finish()
    }
}

impl LagEstimator {
    /// Create an estimator sampling every `dt` seconds.
    ///
    /// The prior is `steer_actuator_delay + initial_lag_margin`.
    pub fn new(config: LagEstimatorConfig, dt: f64, steer_actuator_delay: f64) -> Self {
        let initial_lag = config.initial_lag(steer_actuator_delay);
        let points = SampleBuffer::new(config.window_len(dt));
        let block_avg = BlockAverage::new(config.block_count, config.block_size, 0, initial_lag);

        Self {
            config,
            dt,
            initial_lag,
            t: 0.0,
            lat_active: false,
            steering_pressed: false,
            steering_saturated: false,
            desired_curvature: 0.0,
            v_ego: 0.0,
            yaw_rate: 0.0,
            last_lat_inactive_t: 0.0,
            last_steering_pressed_t: 0.0,
            last_steering_saturated_t: 0.0,
            last_estimate_t: None,
            calibrator: PoseCalibrator::new(),
            points,
            block_avg,
            correlator: CrossCorrelator::new(),
        }
    }

    /// Replace the sample window and block average.
    ///
    /// The block average restarts from `initial_lag` with `valid_blocks`
    /// blocks counted as complete.
    pub fn reset(&mut self, initial_lag: f64, valid_blocks: usize) {
        self.points = SampleBuffer::new(self.config.window_len(self.dt));
        self.block_avg = BlockAverage::new(
            self.config.block_count,
            self.config.block_size,
            valid_blocks,
            initial_lag,
        );
    }

    /// Latch the fields carried by one telemetry message
    pub fn handle_telemetry(&mut self, t: f64, payload: &TelemetryPayload) {
        match payload {
            TelemetryPayload::CarControl(msg) => {
                self.lat_active = msg.lat_active;
            }
            TelemetryPayload::CarState(msg) => {
                self.steering_pressed = msg.steering_pressed;
                self.v_ego = msg.v_ego;
            }
            TelemetryPayload::ControlsState(msg) => {
                self.steering_saturated = msg.steering_saturated;
                self.desired_curvature = msg.desired_curvature;
            }
            TelemetryPayload::LiveCalibration(msg) => {
                self.calibrator.feed_live_calib(msg);
            }
            TelemetryPayload::LivePose(msg) => {
                let pose = self.calibrator.build_calibrated_pose(msg);
                self.yaw_rate = pose.angular_velocity.z;
            }
        }
        self.t = t;
    }

    /// Append one sample built from the latched fields
    pub fn update_points(&mut self) {
        if !self.lat_active {
            self.last_lat_inactive_t = self.t;
        }
        if self.steering_pressed {
            self.last_steering_pressed_t = self.t;
        }
        if self.steering_saturated {
            self.last_steering_saturated_t = self.t;
        }

        let desired = self.desired_curvature * self.v_ego * self.v_ego;
        let actual = self.yaw_rate * self.v_ego;

        let fast = self.v_ego > self.config.min_vego;
        let turning = self.yaw_rate.abs() >= self.config.min_yaw_rate;
        let recovered = [
            self.last_lat_inactive_t,
            self.last_steering_pressed_t,
            self.last_steering_saturated_t,
        ]
        .iter()
        .all(|last_t| self.t - last_t >= self.config.min_recovery_buffer_sec);

        let okay = self.lat_active
            && !self.steering_pressed
            && !self.steering_saturated
            && fast
            && turning
            && recovered;

        trace!(t = self.t, desired, actual, okay, "sample");
        self.points.update(self.t, desired, actual, okay);
    }

    /// Correlate the current window and fold the lag in when it qualifies.
    ///
    /// # Errors
    /// Only on an internal length mismatch in the correlator.
    #[instrument(level = "debug", name = "lag_update_estimate", skip(self), fields(t = self.t))]
    pub fn update_estimate(&mut self) -> Result<EstimateOutcome, ContractError> {
        let outcome = self.evaluate()?;

        counter!("lagd_estimate_outcomes_total", "outcome" => outcome.as_str()).increment(1);
        if let Some(confidence) = outcome.confidence() {
            histogram!("lagd_correlation_confidence").record(confidence);
        }

        if let EstimateOutcome::Accepted { lag, confidence } = outcome {
            self.block_avg.update(lag);
            self.last_estimate_t = Some(self.t);
            debug!(
                lag,
                confidence,
                valid_blocks = self.block_avg.valid_blocks(),
                "lag estimate accepted"
            );
        }

        Ok(outcome)
    }

    fn evaluate(&mut self) -> Result<EstimateOutcome, ContractError> {
        let required = self.config.okay_window_len(self.dt);
        if self.points.num_points() < required {
            return Ok(EstimateOutcome::NotEnoughPoints);
        }

        let num_okay = self.points.num_okay();
        if num_okay < required {
            return Ok(EstimateOutcome::InsufficientOkay { num_okay, required });
        }

        let window = self.points.get();
        if !self.has_new_okay_data(&window) {
            return Ok(EstimateOutcome::NoNewData);
        }

        let peak = self.correlator.correlate(
            &window.desired,
            &window.actual,
            &window.okay,
            self.dt,
            self.config.max_lag,
        )?;

        if peak.confidence < self.config.min_ncc {
            return Ok(EstimateOutcome::LowCorrelation {
                lag: peak.lag,
                confidence: peak.confidence,
            });
        }

        Ok(EstimateOutcome::Accepted {
            lag: peak.lag,
            confidence: peak.confidence,
        })
    }

    /// Whether the window holds okay samples newer than the last accepted
    /// estimate. Sample times are assumed non-decreasing.
    fn has_new_okay_data(&self, window: &SampleWindow) -> bool {
        let Some(last_estimate_t) = self.last_estimate_t else {
            return true;
        };
        if window.times.first().is_some_and(|&t| t > last_estimate_t) {
            return true;
        }

        match window.times.iter().rposition(|&t| t <= last_estimate_t) {
            Some(idx) => window.okay[idx + 1..].iter().any(|&okay| okay),
            None => true,
        }
    }

    /// Build the output record from the block average
    pub fn get_estimate(&self, valid: bool, debug: bool) -> LiveDelay {
        let (valid_mean, current_mean) = self.block_avg.get();
        let valid_blocks = self.block_avg.valid_blocks();

        let (status, lateral_delay) = match valid_mean {
            Some(mean) if valid_blocks >= self.config.min_valid_blocks => {
                (DelayStatus::Estimated, mean)
            }
            _ => (DelayStatus::Unestimated, self.initial_lag),
        };

        LiveDelay {
            valid,
            status,
            lateral_delay,
            lateral_delay_estimate: current_mean.unwrap_or(self.initial_lag),
            valid_blocks,
            points: debug.then(|| self.block_avg.values().to_vec()),
        }
    }

    pub fn config(&self) -> &LagEstimatorConfig {
        &self.config
    }

    /// Sample period (seconds)
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Prior reported while unestimated
    pub fn initial_lag(&self) -> f64 {
        self.initial_lag
    }

    /// Time of the latest handled message
    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn last_estimate_t(&self) -> Option<f64> {
        self.last_estimate_t
    }

    pub fn yaw_rate(&self) -> f64 {
        self.yaw_rate
    }

    pub fn points(&self) -> &SampleBuffer {
        &self.points
    }

    pub fn block_average(&self) -> &BlockAverage {
        &self.block_avg
    }
}
