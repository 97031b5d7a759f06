//! Daemon loop: frame assembly, estimation cadence, emission and persistence.

use contracts::{
    CadenceConfig, ContractError, DaemonBlueprint, LiveDelayFrame, PersistedDelay,
    TelemetryMessage,
};
use metrics::{counter, gauge};
use tracing::{debug, error, info, instrument, warn};

use crate::estimator::{EstimateOutcome, LagEstimator};
use crate::mux::TelemetryMux;
use crate::restore::{retrieve_initial_lag, RestoredLag};

/// Output of one emitting frame
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonStep {
    /// Record to publish
    pub frame: LiveDelayFrame,
    /// What the estimate update did on this frame
    pub outcome: EstimateOutcome,
    /// Record to persist, on persistence frames only
    pub persist: Option<PersistedDelay>,
}

/// Single-owner estimator loop
///
/// Feed every telemetry message to [`LagDaemon::process`] in arrival order.
#[derive(Debug)]
pub struct LagDaemon {
    estimator: LagEstimator,
    mux: TelemetryMux,
    cadence: CadenceConfig,
    vehicle_fingerprint: String,
}

impl LagDaemon {
    /// Zero cadences are treated as 1 (every frame); `ConfigLoader`
    /// rejects them, but a blueprint built in code is not validated.
    pub fn new(blueprint: &DaemonBlueprint) -> Self {
        let mut cadence = blueprint.cadence.clone();
        cadence.estimate_every_frames = cadence.estimate_every_frames.max(1);
        cadence.persist_every_frames = cadence.persist_every_frames.max(1);

        let estimator = LagEstimator::new(
            blueprint.estimator.clone(),
            blueprint.sample_period(),
            blueprint.vehicle.steer_actuator_delay,
        );
        Self {
            estimator,
            mux: TelemetryMux::new(blueprint.cadence.stale_after_sec),
            cadence,
            vehicle_fingerprint: blueprint.vehicle.fingerprint.clone(),
        }
    }

    /// Seed the estimator from a persisted record.
    ///
    /// Any problem with the record is logged and the configured prior kept.
    pub fn warm_start(&mut self, raw: Option<&[u8]>) -> Option<RestoredLag> {
        let Some(raw) = raw else {
            info!("no persisted lag estimate, starting from prior");
            return None;
        };

        match retrieve_initial_lag(
            raw,
            &self.vehicle_fingerprint,
            self.estimator.config().block_count,
        ) {
            Ok(restored) => {
                self.estimator.reset(restored.lag, restored.valid_blocks);
                info!(
                    lag = restored.lag,
                    valid_blocks = restored.valid_blocks,
                    "restored persisted lag estimate"
                );
                counter!("lagd_restore_total", "result" => "restored").increment(1);
                Some(restored)
            }
            Err(e) => {
                error!(error = %e, "failed to retrieve initial lag");
                counter!("lagd_restore_total", "result" => "rejected").increment(1);
                None
            }
        }
    }

    /// Handle one telemetry message.
    ///
    /// Returns a step when the message closes an emitting frame.
    ///
    /// # Errors
    /// Propagates correlator precondition failures; the loop may continue.
    #[instrument(
        level = "trace",
        name = "lag_daemon_process",
        skip(self, msg),
        fields(kind = %msg.kind(), timestamp = msg.timestamp)
    )]
    pub fn process(&mut self, msg: TelemetryMessage) -> Result<Option<DaemonStep>, ContractError> {
        let Some(assembled) = self.mux.push(msg) else {
            return Ok(None);
        };

        if assembled.all_checks {
            for message in &assembled.messages {
                self.estimator
                    .handle_telemetry(message.timestamp, &message.payload);
            }
            self.estimator.update_points();
        } else if assembled.frame % self.cadence.estimate_every_frames == 0 {
            debug!(
                frame = assembled.frame,
                missing = ?self.mux.missing_kinds(assembled.timestamp),
                "frame checks failing"
            );
        }

        if assembled.frame % self.cadence.estimate_every_frames != 0 {
            return Ok(None);
        }

        let outcome = self.estimator.update_estimate()?;
        let live_delay = self
            .estimator
            .get_estimate(assembled.all_checks, self.cadence.debug);

        gauge!("lagd_lateral_delay_seconds").set(live_delay.lateral_delay);
        gauge!("lagd_valid_blocks").set(live_delay.valid_blocks as f64);
        counter!("lagd_frames_emitted_total", "status" => live_delay.status.as_str())
            .increment(1);

        let persist = (assembled.frame % self.cadence.persist_every_frames == 0).then(|| {
            PersistedDelay {
                vehicle_fingerprint: self.vehicle_fingerprint.clone(),
                live_delay: live_delay.clone(),
            }
        });
        if persist.is_some() && !live_delay.valid {
            warn!(frame = assembled.frame, "persisting estimate from an invalid frame");
        }

        Ok(Some(DaemonStep {
            frame: LiveDelayFrame {
                frame_id: assembled.frame,
                timestamp: assembled.timestamp,
                live_delay,
            },
            outcome,
            persist,
        }))
    }

    pub fn estimator(&self) -> &LagEstimator {
        &self.estimator
    }

    pub fn mux(&self) -> &TelemetryMux {
        &self.mux
    }

    pub fn vehicle_fingerprint(&self) -> &str {
        &self.vehicle_fingerprint
    }
}
