//! DaemonBlueprint - Config Loader output
//!
//! Describes one daemon deployment: the vehicle, estimator tuning, loop
//! cadence, ingestion backpressure, persistence location and output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::{CadenceConfig, LagEstimatorConfig};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete daemon configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Vehicle the estimator runs on
    pub vehicle: VehicleConfig,

    /// Estimator tuning
    #[serde(default)]
    pub estimator: LagEstimatorConfig,

    /// Loop cadence
    #[serde(default)]
    pub cadence: CadenceConfig,

    /// Telemetry channel backpressure
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Persisted state location
    #[serde(default)]
    pub params: ParamsConfig,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Vehicle identity and actuator prior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    /// Vehicle configuration identifier (persisted state is keyed on it)
    pub fingerprint: String,

    /// Known steering actuator delay (seconds)
    #[serde(default)]
    pub steer_actuator_delay: f64,
}

/// Ingestion channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Bounded channel capacity (messages)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Behavior when the channel is full
    #[serde(default)]
    pub drop_policy: DropPolicy,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            drop_policy: DropPolicy::default(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1024
}

/// Drop policy (when backpressure is full)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Drop the oldest queued message
    #[default]
    DropOldest,
    /// Drop the incoming message
    DropNewest,
    /// Block the producer until space frees up
    Block,
}

/// Param store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamsConfig {
    /// Directory holding one file per param key
    #[serde(default = "default_params_path")]
    pub path: PathBuf,

    /// Read the persisted estimate on startup
    #[serde(default = "default_true")]
    pub restore: bool,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            path: default_params_path(),
            restore: true,
        }
    }
}

fn default_params_path() -> PathBuf {
    PathBuf::from("./params")
}

fn default_true() -> bool {
    true
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// JSON-lines file output
    File,
    /// Network output (UDP)
    Network,
}

impl DaemonBlueprint {
    /// Blueprint with defaults for everything but the vehicle
    pub fn for_vehicle(fingerprint: impl Into<String>, steer_actuator_delay: f64) -> Self {
        Self {
            version: ConfigVersion::V1,
            vehicle: VehicleConfig {
                fingerprint: fingerprint.into(),
                steer_actuator_delay,
            },
            estimator: LagEstimatorConfig::default(),
            cadence: CadenceConfig::default(),
            ingestion: IngestionConfig::default(),
            params: ParamsConfig::default(),
            sinks: Vec::new(),
        }
    }

    /// Sample period of the estimator (seconds)
    pub fn sample_period(&self) -> f64 {
        self.cadence.dt()
    }

    /// Prior delay reported until the estimate converges
    pub fn initial_lag(&self) -> f64 {
        self.estimator
            .initial_lag(self.vehicle.steer_actuator_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_vehicle_defaults() {
        let blueprint = DaemonBlueprint::for_vehicle("HONDA_CIVIC", 0.1);
        assert_eq!(blueprint.vehicle.fingerprint, "HONDA_CIVIC");
        assert_eq!(blueprint.sample_period(), 0.05);
        assert!((blueprint.initial_lag() - 0.3).abs() < 1e-12);
        assert_eq!(blueprint.params.path, PathBuf::from("./params"));
        assert_eq!(blueprint.ingestion.drop_policy, DropPolicy::DropOldest);
    }

    #[test]
    fn test_minimal_json_fills_sections() {
        let json = r#"{"vehicle": {"fingerprint": "KIA_EV6", "steer_actuator_delay": 0.15}}"#;
        let blueprint: DaemonBlueprint = serde_json::from_str(json).unwrap();
        assert_eq!(blueprint.estimator, LagEstimatorConfig::default());
        assert_eq!(blueprint.cadence.estimate_every_frames, 5);
        assert!(blueprint.params.restore);
        assert!(blueprint.sinks.is_empty());
    }
}
