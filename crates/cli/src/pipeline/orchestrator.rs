//! Pipeline orchestrator - coordinates all components.
//!
//! Telemetry source -> ingestion channel -> `LagDaemon` -> dispatcher,
//! with periodic persistence to the param store.

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{DaemonBlueprint, LiveDelayFrame, PersistedDelay};
use dispatcher::ParamStore;
use ingestion::{
    BackpressureConfig, IngestionPipeline, ReplayPacing, ReplaySource, SyntheticDrive,
    SyntheticDriveConfig, SyntheticSource,
};
use lag_engine::{DaemonStep, LagDaemon};
use observability::{record_live_delay_metrics, record_persisted, record_telemetry_received};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Where telemetry comes from
#[derive(Debug, Clone)]
pub enum TelemetryInput {
    /// JSONL telemetry log
    Replay { path: PathBuf },
    /// Generated drive
    Synthetic { drive: SyntheticDriveConfig },
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Daemon configuration
    pub blueprint: DaemonBlueprint,

    /// Telemetry source
    pub input: TelemetryInput,

    /// Playback speed multiple; `None` is unpaced
    pub speed: Option<f64>,

    /// Maximum number of estimates to emit (None = unlimited)
    pub max_frames: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline until the source is exhausted, a limit is hit or
    /// `shutdown` resolves
    #[instrument(name = "pipeline_run", skip(self, shutdown))]
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Daemon + warm start
        let store = ParamStore::open(&blueprint.params.path).with_context(|| {
            format!(
                "Failed to open param store at {}",
                blueprint.params.path.display()
            )
        })?;
        let mut daemon = LagDaemon::new(blueprint);
        let restored = if blueprint.params.restore {
            let raw = store.get(PersistedDelay::PARAM_KEY).unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read persisted estimate");
                None
            });
            daemon.warm_start(raw.as_deref())
        } else {
            info!("Restore disabled, starting from prior");
            None
        };

        info!(
            vehicle = %blueprint.vehicle.fingerprint,
            initial_lag = daemon.estimator().initial_lag(),
            restored_blocks = restored.map(|r| r.valid_blocks),
            "Lag daemon ready"
        );

        // Ingestion
        let mut ingestion =
            IngestionPipeline::with_config(BackpressureConfig::from(&blueprint.ingestion));
        let source_name = self.register_source(&mut ingestion)?;
        let ingestion_rx = ingestion
            .take_receiver()
            .ok_or_else(|| CliError::source("ingestion receiver already taken"))?;

        // Dispatcher
        let (frame_tx, frame_rx) = mpsc::channel::<LiveDelayFrame>(256);
        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - estimates will only be logged in the summary");
        }
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), frame_rx)
            .await
            .context("Failed to create dispatcher")?;
        let dispatcher_handle = dispatcher.spawn();

        let mut stats = PipelineStats {
            source: source_name,
            restored,
            ..Default::default()
        };

        info!(max_frames = ?self.config.max_frames, "Pipeline running");
        ingestion.start_all();

        let deadline = self.config.timeout.map(|t| tokio::time::Instant::now() + t);
        let timeout = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timeout);
        tokio::pin!(shutdown);
        let mut exhaustion_check = tokio::time::interval(Duration::from_millis(100));
        let mut pending_write: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping pipeline...");
                    break;
                }
                _ = &mut timeout => {
                    warn!(timeout = ?self.config.timeout, "Pipeline timed out");
                    break;
                }
                received = ingestion_rx.recv() => {
                    let Ok(msg) = received else {
                        info!("Telemetry source drained");
                        break;
                    };
                    stats.messages_received += 1;
                    record_telemetry_received(msg.kind().as_str());

                    let step = match daemon.process(msg) {
                        Ok(Some(step)) => step,
                        Ok(None) => continue,
                        Err(e) => {
                            stats.estimate_errors += 1;
                            warn!(error = %e, "Estimate update failed");
                            continue;
                        }
                    };

                    // One write in flight; writes share the store's temp file
                    if step.persist.is_some() {
                        if let Some(previous) = pending_write.take() {
                            if let Err(e) = previous.await {
                                error!(error = %e, "Persistence task failed");
                            }
                        }
                    }

                    let frame = step.frame.clone();
                    if let Some(handle) = self.publish(step, &store, &mut stats) {
                        pending_write = Some(handle);
                    }
                    if frame_tx.send(frame).await.is_err() {
                        warn!("Dispatcher channel closed");
                        break;
                    }

                    if let Some(max) = self.config.max_frames {
                        if stats.delay_metrics.total_frames >= max {
                            info!(frames = stats.delay_metrics.total_frames, "Reached max frames limit");
                            break;
                        }
                    }
                }
                _ = exhaustion_check.tick() => {
                    if ingestion.all_exhausted() {
                        debug!("All telemetry sources exhausted, closing channel");
                        ingestion.close();
                    }
                }
            }
        }

        // Shutdown
        info!("Shutting down pipeline...");
        ingestion.stop_all();
        stats.ingestion = ingestion.metrics().snapshot();

        drop(frame_tx);
        match tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await {
            Ok(Ok(reports)) => stats.sinks = reports,
            Ok(Err(e)) => error!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!("Dispatcher did not flush within 5s"),
        }
        if let Some(handle) = pending_write {
            if let Err(e) = handle.await {
                error!(error = %e, "Persistence task failed");
            }
        }

        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            rate = format!("{:.1}", stats.messages_per_sec()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    fn register_source(&self, ingestion: &mut IngestionPipeline) -> Result<String> {
        let speed = self.config.speed;
        let name = match &self.config.input {
            TelemetryInput::Replay { path } => {
                let pacing = speed.map_or(ReplayPacing::Unpaced, ReplayPacing::Speed);
                let source = ReplaySource::open(path, pacing)
                    .map_err(|e| CliError::source(e.to_string()))?
                    .with_metrics(ingestion.metrics());
                info!(path = %path.display(), ?pacing, "Replaying telemetry log");
                let name = contracts::TelemetrySource::name(&source).to_string();
                ingestion.register_source(Box::new(source))?;
                name
            }
            TelemetryInput::Synthetic { drive } => {
                let mut drive = drive.clone();
                drive.pose_frequency_hz = self.config.blueprint.cadence.pose_frequency_hz;
                info!(
                    duration_sec = drive.duration_sec,
                    true_delay = drive.true_delay,
                    "Generating synthetic drive"
                );
                let source = SyntheticSource::new(SyntheticDrive::new(drive), speed);
                let name = contracts::TelemetrySource::name(&source).to_string();
                ingestion.register_source(Box::new(source))?;
                name
            }
        };
        Ok(name)
    }

    /// Record one emitted estimate and schedule persistence when due
    fn publish(
        &self,
        step: DaemonStep,
        store: &ParamStore,
        stats: &mut PipelineStats,
    ) -> Option<JoinHandle<()>> {
        let DaemonStep {
            frame,
            outcome,
            persist,
        } = step;

        record_live_delay_metrics(&frame);
        stats.delay_metrics.record_outcome(outcome.as_str());
        stats.delay_metrics.update(&frame);

        if self.config.blueprint.cadence.debug || frame.frame_id % 240 == 0 {
            info!(
                frame_id = frame.frame_id,
                valid = frame.live_delay.valid,
                status = frame.live_delay.status.as_str(),
                lateral_delay = format!("{:.4}", frame.live_delay.lateral_delay),
                valid_blocks = frame.live_delay.valid_blocks,
                outcome = outcome.as_str(),
                "Estimate emitted"
            );
        }

        let record = persist?;
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                record_persisted(frame.frame_id);
                stats.delay_metrics.record_persisted();
                Some(store.put_nonblocking(PersistedDelay::PARAM_KEY, bytes))
            }
            Err(e) => {
                error!(error = %e, "Failed to encode persisted estimate");
                None
            }
        }
    }
}
