//! LiveDelay - estimator output
//!
//! The lateral delay record emitted at fixed cadence and persisted for
//! warm-starting the next session.

use serde::{Deserialize, Serialize};

/// Whether enough blocks have completed to trust the delay estimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayStatus {
    /// Still reporting the configured prior
    #[default]
    Unestimated,
    /// Reporting the learned block average
    Estimated,
}

impl DelayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DelayStatus::Unestimated => "unestimated",
            DelayStatus::Estimated => "estimated",
        }
    }
}

/// Lateral delay estimate record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDelay {
    /// All inputs were present and fresh when this record was produced
    pub valid: bool,

    /// Estimation status
    pub status: DelayStatus,

    /// Trusted delay (seconds): mean of completed blocks, or the prior
    pub lateral_delay: f64,

    /// Preview delay (seconds): includes the block being filled
    pub lateral_delay_estimate: f64,

    /// Number of completed blocks
    pub valid_blocks: usize,

    /// Raw block means (debug only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<f64>>,
}

impl LiveDelay {
    /// Record reporting only the prior
    pub fn unestimated(initial_lag: f64) -> Self {
        Self {
            valid: false,
            status: DelayStatus::Unestimated,
            lateral_delay: initial_lag,
            lateral_delay_estimate: initial_lag,
            valid_blocks: 0,
            points: None,
        }
    }

    pub fn is_estimated(&self) -> bool {
        self.status == DelayStatus::Estimated
    }
}

/// Estimate as published on the output bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDelayFrame {
    /// Pose frame counter at emission (monotonically increasing)
    pub frame_id: u64,

    /// Timestamp of the pose message that triggered emission (seconds)
    pub timestamp: f64,

    /// Estimate payload
    pub live_delay: LiveDelay,
}

/// Persisted warm-start record
///
/// Stored under [`PersistedDelay::PARAM_KEY`]. Only reused when the stored
/// fingerprint matches the current vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDelay {
    /// Vehicle configuration the estimate was learned on
    pub vehicle_fingerprint: String,

    /// Last emitted estimate
    pub live_delay: LiveDelay,
}

impl PersistedDelay {
    pub const PARAM_KEY: &'static str = "LiveDelay";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_omitted_without_debug() {
        let record = LiveDelay::unestimated(0.3);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("points"));
        assert!(json.contains(r#""status":"unestimated""#));

        let decoded: LiveDelay = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_persisted_record_shape() {
        let persisted = PersistedDelay {
            vehicle_fingerprint: "TESLA_MODEL_3".into(),
            live_delay: LiveDelay {
                valid: true,
                status: DelayStatus::Estimated,
                lateral_delay: 0.31,
                lateral_delay_estimate: 0.32,
                valid_blocks: 10,
                points: Some(vec![0.3; 3]),
            },
        };
        let value = serde_json::to_value(&persisted).unwrap();
        assert_eq!(value["vehicle_fingerprint"], "TESLA_MODEL_3");
        assert_eq!(value["live_delay"]["valid_blocks"], 10);
        assert_eq!(value["live_delay"]["points"].as_array().unwrap().len(), 3);
    }
}
