//! Device-to-vehicle frame calibration for pose telemetry.

use contracts::{LiveCalibrationData, LivePoseData, Vector3 as WireVector3};
use nalgebra::{Rotation3, Vector3};

/// Pose expressed in the calibrated (vehicle) frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratedPose {
    /// Roll, pitch, yaw of the vehicle frame in NED (rad)
    pub orientation: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

/// Rotates device-frame pose into the vehicle frame
#[derive(Debug, Clone)]
pub struct PoseCalibrator {
    calib_from_device: Rotation3<f64>,
    calibrated: bool,
}

impl Default for PoseCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseCalibrator {
    /// Identity calibration until a live calibration arrives
    pub fn new() -> Self {
        Self {
            calib_from_device: Rotation3::identity(),
            calibrated: false,
        }
    }

    /// Latch a calibration message; anything but exactly three angles is ignored
    pub fn feed_live_calib(&mut self, calib: &LiveCalibrationData) {
        if let [roll, pitch, yaw] = calib.rpy_calib.as_slice() {
            let device_from_calib = Rotation3::from_euler_angles(*roll, *pitch, *yaw);
            self.calib_from_device = device_from_calib.transpose();
            self.calibrated = true;
        }
    }

    /// A calibration has been applied
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn calib_from_device(&self) -> &Rotation3<f64> {
        &self.calib_from_device
    }

    pub fn build_calibrated_pose(&self, pose: &LivePoseData) -> CalibratedPose {
        let o = pose.orientation_ned;
        let ned_from_device = Rotation3::from_euler_angles(o.x, o.y, o.z);
        let ned_from_calib = ned_from_device * self.calib_from_device.transpose();
        let (roll, pitch, yaw) = ned_from_calib.euler_angles();

        CalibratedPose {
            orientation: Vector3::new(roll, pitch, yaw),
            angular_velocity: self.calib_from_device * to_na(pose.angular_velocity),
            acceleration: self.calib_from_device * to_na(pose.acceleration),
            velocity: self.calib_from_device * to_na(pose.velocity),
        }
    }
}

fn to_na(v: WireVector3) -> Vector3<f64> {
    Vector3::new(v.x, v.y, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn pose_with_rates(x: f64, y: f64, z: f64) -> LivePoseData {
        LivePoseData {
            angular_velocity: WireVector3::new(x, y, z),
            ..Default::default()
        }
    }

    #[test]
    fn test_identity_until_calibrated() {
        let calibrator = PoseCalibrator::new();
        assert!(!calibrator.is_calibrated());
        let pose = calibrator.build_calibrated_pose(&pose_with_rates(0.1, 0.2, 0.3));
        assert_eq!(pose.angular_velocity, Vector3::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_wrong_length_calibration_ignored() {
        let mut calibrator = PoseCalibrator::new();
        calibrator.feed_live_calib(&LiveCalibrationData {
            rpy_calib: vec![0.1, 0.2],
        });
        assert!(!calibrator.is_calibrated());
        assert_eq!(*calibrator.calib_from_device(), Rotation3::identity());
    }

    #[test]
    fn test_yaw_rate_invariant_under_mount_yaw() {
        let mut calibrator = PoseCalibrator::new();
        calibrator.feed_live_calib(&LiveCalibrationData {
            rpy_calib: vec![0.0, 0.0, 0.3],
        });
        let pose = calibrator.build_calibrated_pose(&pose_with_rates(0.0, 0.0, 0.25));
        assert!((pose.angular_velocity.z - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_pitched_mount_projects_yaw_rate() {
        // Device pitched 90°: its x axis points along the vehicle z axis
        let mut calibrator = PoseCalibrator::new();
        calibrator.feed_live_calib(&LiveCalibrationData {
            rpy_calib: vec![0.0, FRAC_PI_2, 0.0],
        });
        let pose = calibrator.build_calibrated_pose(&pose_with_rates(0.2, 0.0, 0.0));
        assert!((pose.angular_velocity.z.abs() - 0.2).abs() < 1e-12);
        assert!(pose.angular_velocity.x.abs() < 1e-12);
    }

    #[test]
    fn test_orientation_composes_mount_rotation() {
        let mut calibrator = PoseCalibrator::new();
        calibrator.feed_live_calib(&LiveCalibrationData {
            rpy_calib: vec![0.0, 0.0, 0.1],
        });
        let pose = calibrator.build_calibrated_pose(&LivePoseData {
            orientation_ned: WireVector3::new(0.0, 0.0, 0.5),
            ..Default::default()
        });
        assert!((pose.orientation.z - 0.6).abs() < 1e-12);
    }
}
