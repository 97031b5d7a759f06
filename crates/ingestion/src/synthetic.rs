//! Synthetic drive generator
//!
//! Produces all five telemetry kinds for a drive at constant speed with a
//! sinusoidal yaw rate that trails the commanded curvature by a known delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    CarControlData, CarStateData, ControlsStateData, LiveCalibrationData, LivePoseData,
    TelemetryCallback, TelemetryMessage, TelemetryPayload, TelemetrySource, Vector3,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Synthetic drive parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticDriveConfig {
    /// Drive length (s)
    pub duration_sec: f64,
    /// Pose rate (Hz); the other kinds follow it, calibration at 1 Hz
    pub pose_frequency_hz: f64,
    /// Constant vehicle speed (m/s)
    pub v_ego: f64,
    /// Mean yaw rate (rad/s)
    pub yaw_rate_mean: f64,
    /// Yaw rate sinusoid amplitude (rad/s)
    pub yaw_rate_amplitude: f64,
    /// Yaw rate sinusoid frequency (Hz)
    pub yaw_rate_frequency_hz: f64,
    /// Delay between commanded curvature and measured yaw rate (s)
    pub true_delay: f64,
    /// Uniform noise half-width added to the measured yaw rate (rad/s)
    pub noise: f64,
    /// Period of driver-override episodes; `None` disables them
    pub override_every_sec: Option<f64>,
    /// Length of each override episode (s)
    pub override_duration_sec: f64,
    /// Device mount yaw (rad), reported via live calibration
    pub mount_yaw: f64,
    /// RNG seed
    pub seed: u64,
}

impl Default for SyntheticDriveConfig {
    fn default() -> Self {
        Self {
            duration_sec: 300.0,
            pose_frequency_hz: 20.0,
            v_ego: 20.0,
            yaw_rate_mean: 0.1,
            yaw_rate_amplitude: 0.05,
            yaw_rate_frequency_hz: 0.2,
            true_delay: 0.3,
            noise: 0.0,
            override_every_sec: None,
            override_duration_sec: 1.0,
            mount_yaw: 0.0,
            seed: 42,
        }
    }
}

impl SyntheticDriveConfig {
    fn yaw_rate(&self, t: f64) -> f64 {
        let phase = 2.0 * std::f64::consts::PI * self.yaw_rate_frequency_hz * t;
        self.yaw_rate_mean + self.yaw_rate_amplitude * phase.sin()
    }

    fn overriding(&self, t: f64) -> bool {
        match self.override_every_sec {
            Some(period) if period > 0.0 => {
                let into = t % period;
                t >= period && into < self.override_duration_sec
            }
            _ => false,
        }
    }

    /// Number of pose ticks in the drive
    pub fn ticks(&self) -> usize {
        (self.duration_sec * self.pose_frequency_hz).max(0.0) as usize
    }
}

/// Deterministic synthetic telemetry
#[derive(Debug, Clone)]
pub struct SyntheticDrive {
    config: SyntheticDriveConfig,
}

impl SyntheticDrive {
    pub fn new(config: SyntheticDriveConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyntheticDriveConfig {
        &self.config
    }

    /// Messages in emission order; each tick ends with its pose
    pub fn messages(&self) -> impl Iterator<Item = TelemetryMessage> + '_ {
        let c = &self.config;
        let dt = 1.0 / c.pose_frequency_hz;
        let calib_every = c.pose_frequency_hz.round().max(1.0) as usize;
        let mut rng = StdRng::seed_from_u64(c.seed);

        (0..c.ticks()).flat_map(move |i| {
            let t = i as f64 * dt;
            let noise = if c.noise > 0.0 {
                rng.random_range(-c.noise..=c.noise)
            } else {
                0.0
            };
            let measured = c.yaw_rate(t) + noise;
            let commanded = c.yaw_rate(t + c.true_delay);

            let mut tick = Vec::with_capacity(5);
            tick.push(TelemetryMessage::new(
                t,
                TelemetryPayload::CarControl(CarControlData { lat_active: true }),
            ));
            tick.push(TelemetryMessage::new(
                t,
                TelemetryPayload::CarState(CarStateData {
                    steering_pressed: c.overriding(t),
                    v_ego: c.v_ego,
                }),
            ));
            tick.push(TelemetryMessage::new(
                t,
                TelemetryPayload::ControlsState(ControlsStateData {
                    desired_curvature: commanded / c.v_ego,
                    steering_saturated: false,
                }),
            ));
            if i % calib_every == 0 {
                tick.push(TelemetryMessage::new(
                    t,
                    TelemetryPayload::LiveCalibration(LiveCalibrationData {
                        rpy_calib: vec![0.0, 0.0, c.mount_yaw],
                    }),
                ));
            }
            // A pure mount yaw leaves the z rate unchanged in the device frame
            tick.push(TelemetryMessage::new(
                t,
                TelemetryPayload::LivePose(LivePoseData {
                    angular_velocity: Vector3::new(0.0, 0.0, measured),
                    velocity: Vector3::new(c.v_ego, 0.0, 0.0),
                    ..Default::default()
                }),
            ));
            tick
        })
    }
}

/// [`SyntheticDrive`] as a telemetry source
pub struct SyntheticSource {
    name: String,
    drive: SyntheticDrive,
    /// Wall-clock pacing as a multiple of real time; `None` is unpaced
    speed: Option<f64>,
    listening: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
}

impl SyntheticSource {
    pub fn new(drive: SyntheticDrive, speed: Option<f64>) -> Self {
        Self {
            name: "synthetic".to_string(),
            drive,
            speed,
            listening: Arc::new(AtomicBool::new(false)),
            exhausted: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl TelemetrySource for SyntheticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, callback: TelemetryCallback) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let drive = self.drive.clone();
        let tick = self
            .speed
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| Duration::from_secs_f64(1.0 / (drive.config().pose_frequency_hz * s)));
        let listening = self.listening.clone();
        let exhausted = self.exhausted.clone();
        let name = self.name.clone();

        std::thread::spawn(move || {
            debug!(source = %name, ticks = drive.config().ticks(), "synthetic drive started");
            let mut emitted = 0u64;
            for msg in drive.messages() {
                if !listening.load(Ordering::Relaxed) {
                    break;
                }
                let is_pose = matches!(msg.payload, TelemetryPayload::LivePose(_));
                callback(msg);
                emitted += 1;
                if let (true, Some(tick)) = (is_pose, tick) {
                    std::thread::sleep(tick);
                }
            }
            info!(source = %name, emitted, "synthetic drive finished");
            exhausted.store(true, Ordering::SeqCst);
            listening.store(false, Ordering::SeqCst);
        });
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }
}
