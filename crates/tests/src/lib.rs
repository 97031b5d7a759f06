//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - Configuration and wire-format contracts
//! - Convergence on synthetic drives with a known delay
//! - Restart from persisted state
//! - The async path: ingestion -> daemon -> dispatcher

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{DaemonBlueprint, DropPolicy, TelemetryKind, TelemetryMessage};

    #[test]
    fn test_blueprint_survives_toml_round_trip() {
        let mut blueprint = DaemonBlueprint::for_vehicle("HYUNDAI_IONIQ_5", 0.1);
        blueprint.cadence.persist_every_frames = 600;
        blueprint.ingestion.drop_policy = DropPolicy::Block;

        let toml = ConfigLoader::to_toml(&blueprint).unwrap();
        let loaded = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();

        assert_eq!(loaded.vehicle.fingerprint, "HYUNDAI_IONIQ_5");
        assert_eq!(loaded.cadence.persist_every_frames, 600);
        assert_eq!(loaded.ingestion.drop_policy, DropPolicy::Block);
        assert_eq!(loaded.estimator, blueprint.estimator);
    }

    #[test]
    fn test_telemetry_line_format() {
        let line = r#"{"timestamp": 12.5, "kind": "controls_state", "desired_curvature": 0.002, "steering_saturated": false}"#;
        let msg: TelemetryMessage = serde_json::from_str(line).unwrap();
        assert_eq!(msg.kind(), TelemetryKind::ControlsState);
        assert_eq!(msg.timestamp, 12.5);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use contracts::{
        DaemonBlueprint, DelayStatus, DropPolicy, LiveDelayFrame, PersistedDelay, SinkConfig,
        SinkType,
    };
    use dispatcher::{create_dispatcher, ParamStore};
    use ingestion::{
        BackpressureConfig, IngestionPipeline, ReplayPacing, ReplaySource, SyntheticDrive,
        SyntheticDriveConfig, SyntheticSource,
    };
    use lag_engine::{DaemonStep, LagDaemon};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn blueprint() -> DaemonBlueprint {
        let mut blueprint = DaemonBlueprint::for_vehicle("TOYOTA_RAV4", 0.1);
        blueprint.ingestion.drop_policy = DropPolicy::Block;
        blueprint
    }

    fn drive(duration_sec: f64, true_delay: f64) -> SyntheticDrive {
        SyntheticDrive::new(SyntheticDriveConfig {
            duration_sec,
            true_delay,
            ..Default::default()
        })
    }

    fn run_daemon(daemon: &mut LagDaemon, drive: &SyntheticDrive) -> Vec<DaemonStep> {
        drive
            .messages()
            .filter_map(|msg| daemon.process(msg).unwrap())
            .collect()
    }

    /// Synthetic drive -> LagDaemon, checked against the delay baked into
    /// the drive
    #[test]
    fn test_converges_to_true_delay() {
        let mut daemon = LagDaemon::new(&blueprint());
        let steps = run_daemon(&mut daemon, &drive(300.0, 0.3));

        let first = &steps[0].frame.live_delay;
        assert_eq!(first.status, DelayStatus::Unestimated);
        assert!((first.lateral_delay - 0.3).abs() < 1e-12, "prior is actuator delay + margin");

        let last = &steps.last().unwrap().frame.live_delay;
        assert_eq!(last.status, DelayStatus::Estimated);
        assert!(last.valid);
        assert!(
            (last.lateral_delay - 0.3).abs() < 0.02,
            "estimated {} s",
            last.lateral_delay
        );
        assert!(last.valid_blocks >= 5);
    }

    #[test]
    fn test_noisy_drive_with_overrides_finds_longer_delay() {
        let mut daemon = LagDaemon::new(&blueprint());
        let noisy = SyntheticDrive::new(SyntheticDriveConfig {
            duration_sec: 300.0,
            true_delay: 0.5,
            noise: 0.002,
            override_every_sec: Some(60.0),
            ..Default::default()
        });
        let steps = run_daemon(&mut daemon, &noisy);

        let last = &steps.last().unwrap().frame.live_delay;
        assert_eq!(last.status, DelayStatus::Estimated);
        assert!(
            (last.lateral_delay - 0.5).abs() < 0.05,
            "estimated {} s",
            last.lateral_delay
        );
    }

    /// A persisted record lets the next session publish `estimated` from
    /// its first frame
    #[test]
    fn test_restart_resumes_from_persisted_record() {
        let dir = TempDir::new().unwrap();
        let store = ParamStore::open(dir.path()).unwrap();

        let mut first = LagDaemon::new(&blueprint());
        let steps = run_daemon(&mut first, &drive(300.0, 0.3));
        let record = steps
            .iter()
            .rev()
            .find_map(|s| s.persist.clone())
            .expect("at least one persisted record");
        store.put_json(PersistedDelay::PARAM_KEY, &record).unwrap();

        let mut second = LagDaemon::new(&blueprint());
        let raw = store.get(PersistedDelay::PARAM_KEY).unwrap();
        let restored = second.warm_start(raw.as_deref()).unwrap();
        assert_eq!(restored.valid_blocks, record.live_delay.valid_blocks);

        let steps = run_daemon(&mut second, &drive(1.0, 0.3));
        let resumed = &steps[0].frame.live_delay;
        assert_eq!(resumed.status, DelayStatus::Estimated);
        assert!((resumed.lateral_delay - 0.3).abs() < 0.05);
    }

    #[test]
    fn test_record_from_other_vehicle_ignored() {
        let dir = TempDir::new().unwrap();
        let store = ParamStore::open(dir.path()).unwrap();

        let mut first = LagDaemon::new(&DaemonBlueprint::for_vehicle("FORD_BRONCO", 0.1));
        let record = run_daemon(&mut first, &drive(60.0, 0.3))
            .into_iter()
            .find_map(|s| s.persist)
            .unwrap();
        store.put_json(PersistedDelay::PARAM_KEY, &record).unwrap();

        let mut second = LagDaemon::new(&blueprint());
        let raw = store.get(PersistedDelay::PARAM_KEY).unwrap();
        assert!(second.warm_start(raw.as_deref()).is_none());
    }

    /// SyntheticSource -> IngestionPipeline -> LagDaemon -> Dispatcher -> FileSink
    #[tokio::test]
    async fn test_async_pipeline_publishes_every_emitted_frame() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("live_delay.jsonl");
        let blueprint = blueprint();

        let mut ingestion =
            IngestionPipeline::with_config(BackpressureConfig::from(&blueprint.ingestion));
        ingestion
            .register_source(Box::new(SyntheticSource::new(drive(20.0, 0.3), None)))
            .unwrap();
        let rx = ingestion.take_receiver().unwrap();

        let (frame_tx, frame_rx) = mpsc::channel::<LiveDelayFrame>(64);
        let sinks = vec![SinkConfig {
            name: "jsonl".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 500,
            params: HashMap::from([("path".to_string(), out.display().to_string())]),
        }];
        let dispatcher_handle = create_dispatcher(sinks, frame_rx).await.unwrap().spawn();

        ingestion.start_all();
        let mut daemon = LagDaemon::new(&blueprint);
        let mut emitted = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Ok(msg)) => {
                    if let Some(step) = daemon.process(msg).unwrap() {
                        emitted.push(step.frame.frame_id);
                        frame_tx.send(step.frame).await.unwrap();
                    }
                }
                Ok(Err(_)) => break,
                Err(_) if ingestion.all_exhausted() => ingestion.close(),
                Err(_) => {}
            }
        }
        drop(frame_tx);
        tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .unwrap()
            .unwrap();

        // 400 pose frames, one estimate every 5
        assert_eq!(emitted.len(), 80);
        assert_eq!(ingestion.metrics().snapshot().messages_dropped, 0);

        let written: Vec<LiveDelayFrame> = std::fs::read_to_string(&out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let ids: Vec<u64> = written.iter().map(|f| f.frame_id).collect();
        assert_eq!(ids, emitted);
    }

    /// Replaying a written log yields the same estimates as the drive itself
    #[tokio::test]
    async fn test_replay_matches_direct_processing() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("drive.jsonl");
        let drive = drive(40.0, 0.3);
        let messages: Vec<_> = drive.messages().collect();
        ingestion::write_telemetry_log(&log, &messages).unwrap();

        let mut direct = LagDaemon::new(&blueprint());
        let expected: Vec<LiveDelayFrame> = run_daemon(&mut direct, &drive)
            .into_iter()
            .map(|s| s.frame)
            .collect();

        let mut ingestion = IngestionPipeline::with_config(BackpressureConfig::new(
            1024,
            DropPolicy::Block,
        ));
        ingestion
            .register_source(Box::new(
                ReplaySource::open(&log, ReplayPacing::Unpaced).unwrap(),
            ))
            .unwrap();
        let rx = ingestion.take_receiver().unwrap();
        ingestion.start_all();

        let mut replayed = LagDaemon::new(&blueprint());
        let mut frames = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Ok(msg)) => {
                    if let Some(step) = replayed.process(msg).unwrap() {
                        frames.push(step.frame);
                    }
                }
                Ok(Err(_)) => break,
                Err(_) if ingestion.all_exhausted() => ingestion.close(),
                Err(_) => {}
            }
        }

        assert_eq!(frames.len(), expected.len());
        for (got, want) in frames.iter().zip(&expected) {
            assert_eq!(got.frame_id, want.frame_id);
            assert_eq!(got.live_delay.status, want.live_delay.status);
            assert!((got.live_delay.lateral_delay - want.live_delay.lateral_delay).abs() < 1e-9);
        }
    }
}
