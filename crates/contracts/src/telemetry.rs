//! TelemetryMessage - inbound bus contract
//!
//! The closed set of telemetry kinds consumed by the lag estimator. Each kind
//! carries only the fields the estimator latches.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ContractError;

/// Telemetry kind (one per bus service)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    /// Lateral-control engagement
    CarControl,
    /// Driver steering override + vehicle speed
    CarState,
    /// Desired curvature + lateral controller saturation
    ControlsState,
    /// Device-to-vehicle calibration transform
    LiveCalibration,
    /// Raw device pose (drives the estimator loop)
    LivePose,
}

impl TelemetryKind {
    /// All kinds, in bus order
    pub const ALL: [TelemetryKind; 5] = [
        TelemetryKind::CarControl,
        TelemetryKind::CarState,
        TelemetryKind::ControlsState,
        TelemetryKind::LiveCalibration,
        TelemetryKind::LivePose,
    ];

    /// Wire name of the kind
    pub fn as_str(self) -> &'static str {
        match self {
            TelemetryKind::CarControl => "car_control",
            TelemetryKind::CarState => "car_state",
            TelemetryKind::ControlsState => "controls_state",
            TelemetryKind::LiveCalibration => "live_calibration",
            TelemetryKind::LivePose => "live_pose",
        }
    }

    /// Dense index, usable for fixed-size per-kind tables
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TelemetryKind {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TelemetryKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ContractError::UnknownTelemetryKind {
                kind: s.to_string(),
            })
    }
}

/// Timestamped telemetry message
///
/// Serialized flat, e.g.
/// `{"timestamp": 1.25, "kind": "car_state", "steering_pressed": false, "v_ego": 20.0}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    /// Bus timestamp (seconds, monotonic)
    pub timestamp: f64,

    /// Kind-specific payload
    #[serde(flatten)]
    pub payload: TelemetryPayload,
}

impl TelemetryMessage {
    /// Create a new message
    pub fn new(timestamp: f64, payload: TelemetryPayload) -> Self {
        Self { timestamp, payload }
    }

    /// Kind of the carried payload
    pub fn kind(&self) -> TelemetryKind {
        self.payload.kind()
    }
}

/// Telemetry payload, one variant per kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryPayload {
    CarControl(CarControlData),
    CarState(CarStateData),
    ControlsState(ControlsStateData),
    LiveCalibration(LiveCalibrationData),
    LivePose(LivePoseData),
}

impl TelemetryPayload {
    /// Kind of this payload
    pub fn kind(&self) -> TelemetryKind {
        match self {
            TelemetryPayload::CarControl(_) => TelemetryKind::CarControl,
            TelemetryPayload::CarState(_) => TelemetryKind::CarState,
            TelemetryPayload::ControlsState(_) => TelemetryKind::ControlsState,
            TelemetryPayload::LiveCalibration(_) => TelemetryKind::LiveCalibration,
            TelemetryPayload::LivePose(_) => TelemetryKind::LivePose,
        }
    }
}

/// Lateral-control engagement state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CarControlData {
    /// Lateral control is actively steering
    pub lat_active: bool,
}

/// Driver input and vehicle speed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CarStateData {
    /// Driver is applying torque to the wheel
    pub steering_pressed: bool,
    /// Vehicle speed (m/s)
    pub v_ego: f64,
}

/// Lateral controller output
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlsStateData {
    /// Commanded path curvature (1/m)
    pub desired_curvature: f64,
    /// Active lateral controller reports saturation
    pub steering_saturated: bool,
}

/// Device mounting calibration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveCalibrationData {
    /// Roll, pitch, yaw of the device relative to the vehicle (rad).
    /// Ignored unless exactly three values are present.
    pub rpy_calib: Vec<f64>,
}

/// Device-frame pose
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LivePoseData {
    /// Device orientation in NED (roll, pitch, yaw; rad)
    #[serde(default)]
    pub orientation_ned: Vector3,
    /// Device angular velocity (rad/s)
    pub angular_velocity: Vector3,
    /// Device acceleration (m/s²)
    #[serde(default)]
    pub acceleration: Vector3,
    /// Device velocity (m/s)
    #[serde(default)]
    pub velocity: Vector3,
}

/// 3D vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_names() {
        for kind in TelemetryKind::ALL {
            assert_eq!(kind.as_str().parse::<TelemetryKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "gps_location".parse::<TelemetryKind>().unwrap_err();
        assert!(matches!(err, ContractError::UnknownTelemetryKind { .. }));
        assert!(err.to_string().contains("gps_location"));
    }

    #[test]
    fn test_message_wire_format() {
        let line = r#"{"timestamp":1.5,"kind":"car_state","steering_pressed":true,"v_ego":21.0}"#;
        let msg: TelemetryMessage = serde_json::from_str(line).unwrap();
        assert_eq!(msg.kind(), TelemetryKind::CarState);
        assert_eq!(msg.timestamp, 1.5);
        match msg.payload {
            TelemetryPayload::CarState(data) => {
                assert!(data.steering_pressed);
                assert_eq!(data.v_ego, 21.0);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_unknown_wire_kind_fails_decode() {
        let line = r#"{"timestamp":1.5,"kind":"radar_state","leads":[]}"#;
        assert!(serde_json::from_str::<TelemetryMessage>(line).is_err());
    }

    #[test]
    fn test_live_pose_optional_fields() {
        let line = r#"{"timestamp":0.05,"kind":"live_pose","angular_velocity":{"x":0.0,"y":0.0,"z":0.1}}"#;
        let msg: TelemetryMessage = serde_json::from_str(line).unwrap();
        let TelemetryPayload::LivePose(pose) = msg.payload else {
            panic!("expected live_pose");
        };
        assert_eq!(pose.angular_velocity.z, 0.1);
        assert_eq!(pose.acceleration, Vector3::default());
    }
}
