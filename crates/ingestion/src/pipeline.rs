//! Ingestion Pipeline main entry

use std::collections::HashMap;
use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{TelemetryCallback, TelemetryMessage, TelemetrySource};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{BackpressureConfig, DropPolicy, IngestionMetrics};
use crate::error::{IngestionError, Result};

/// Ingestion Pipeline
///
/// Owns the registered telemetry sources and merges their output into one
/// bounded channel.
pub struct IngestionPipeline {
    /// Registered sources, by name
    sources: HashMap<String, Box<dyn TelemetrySource>>,

    /// Shared metrics
    metrics: Arc<IngestionMetrics>,

    /// Data sender (shared by all sources)
    tx: Sender<TelemetryMessage>,

    /// Data receiver
    rx: Option<Receiver<TelemetryMessage>>,

    /// Receiver handle used to evict the oldest message under `DropOldest`
    evict: Receiver<TelemetryMessage>,

    config: BackpressureConfig,
}

impl IngestionPipeline {
    /// Create a pipeline with the default drop policy
    pub fn new(channel_capacity: usize) -> Self {
        Self::with_config(BackpressureConfig {
            channel_capacity,
            ..Default::default()
        })
    }

    /// Create with custom backpressure configuration
    pub fn with_config(config: BackpressureConfig) -> Self {
        let (tx, rx) = bounded(config.channel_capacity.max(1));

        Self {
            sources: HashMap::new(),
            metrics: Arc::new(IngestionMetrics::new()),
            tx,
            evict: rx.clone(),
            rx: Some(rx),
            config,
        }
    }

    /// Register a telemetry source
    ///
    /// # Errors
    /// `DuplicateSource` if a source with the same name is registered.
    #[instrument(
        name = "ingestion_register_source",
        skip(self, source),
        fields(source = %source.name())
    )]
    pub fn register_source(&mut self, source: Box<dyn TelemetrySource>) -> Result<()> {
        let name = source.name().to_string();
        if self.sources.contains_key(&name) {
            return Err(IngestionError::DuplicateSource { source_name: name });
        }
        debug!(source = %name, "registered telemetry source");
        self.sources.insert(name, source);
        Ok(())
    }

    /// Start all registered sources
    #[instrument(name = "ingestion_start_all", skip(self))]
    pub fn start_all(&self) {
        info!(count = self.sources.len(), "starting all telemetry sources");
        for (name, source) in &self.sources {
            if !source.is_listening() {
                debug!(source = %name, "starting source");
                source.listen(self.callback_for(name));
            }
        }
    }

    /// Stop all sources
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        info!(count = self.sources.len(), "stopping all telemetry sources");
        for (name, source) in &self.sources {
            if source.is_listening() {
                debug!(source = %name, "stopping source");
                source.stop();
            }
        }
    }

    fn callback_for(&self, name: &str) -> TelemetryCallback {
        let tx = self.tx.clone();
        let evict = self.evict.clone();
        let metrics = self.metrics.clone();
        let drop_policy = self.config.drop_policy;
        let name = name.to_string();

        Arc::new(move |msg| {
            metrics.record_received();
            send_message(&tx, &evict, msg, &metrics, &name, drop_policy);
            metrics.update_queue_len(tx.len());
        })
    }

    /// Close the channel; queued messages can still be drained
    pub fn close(&self) {
        if self.tx.close() {
            debug!("ingestion channel closed");
        }
    }

    /// Get data stream receiver
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_receiver(&mut self) -> Option<Receiver<TelemetryMessage>> {
        self.rx.take()
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_source_listening(&self, name: &str) -> bool {
        self.sources
            .get(name)
            .map(|s| s.is_listening())
            .unwrap_or(false)
    }

    /// Every registered source has finished emitting
    pub fn all_exhausted(&self) -> bool {
        self.sources.values().all(|s| s.is_exhausted())
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Send one message, applying the drop policy when the channel is full
fn send_message(
    tx: &Sender<TelemetryMessage>,
    evict: &Receiver<TelemetryMessage>,
    msg: TelemetryMessage,
    metrics: &IngestionMetrics,
    source: &str,
    drop_policy: DropPolicy,
) {
    let msg = match tx.try_send(msg) {
        Ok(()) => return,
        Err(TrySendError::Closed(_)) => {
            warn!(source = %source, "channel closed");
            return;
        }
        Err(TrySendError::Full(msg)) => msg,
    };

    match drop_policy {
        DropPolicy::DropNewest => {
            metrics.record_dropped();
            trace!(source = %source, "message dropped (newest)");
        }
        DropPolicy::DropOldest => {
            let mut msg = msg;
            loop {
                if evict.try_recv().is_ok() {
                    metrics.record_dropped();
                    trace!(source = %source, "message dropped (oldest)");
                }
                match tx.try_send(msg) {
                    Ok(()) => break,
                    Err(TrySendError::Full(back)) => msg = back,
                    Err(TrySendError::Closed(_)) => {
                        warn!(source = %source, "channel closed");
                        break;
                    }
                }
            }
        }
        DropPolicy::Block => {
            if tx.send_blocking(msg).is_err() {
                warn!(source = %source, "channel closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CarStateData, TelemetryPayload};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Source that emits a fixed number of messages synchronously on listen
    struct BurstSource {
        name: String,
        count: usize,
        listening: AtomicBool,
        exhausted: AtomicBool,
    }

    impl BurstSource {
        fn new(name: &str, count: usize) -> Self {
            Self {
                name: name.to_string(),
                count,
                listening: AtomicBool::new(false),
                exhausted: AtomicBool::new(false),
            }
        }
    }

    impl TelemetrySource for BurstSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn listen(&self, callback: TelemetryCallback) {
            self.listening.store(true, Ordering::SeqCst);
            for i in 0..self.count {
                callback(TelemetryMessage::new(
                    i as f64,
                    TelemetryPayload::CarState(CarStateData::default()),
                ));
            }
            self.exhausted.store(true, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.listening.store(false, Ordering::SeqCst);
        }

        fn is_listening(&self) -> bool {
            self.listening.load(Ordering::SeqCst)
        }

        fn is_exhausted(&self) -> bool {
            self.exhausted.load(Ordering::SeqCst)
        }
    }

    fn drain(rx: &Receiver<TelemetryMessage>) -> Vec<f64> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|m| m.timestamp)
            .collect()
    }

    #[test]
    fn test_pipeline_creation() {
        let pipeline = IngestionPipeline::new(100);
        assert_eq!(pipeline.source_count(), 0);
        assert!(pipeline.all_exhausted());
    }

    #[test]
    fn test_take_receiver_once() {
        let mut pipeline = IngestionPipeline::new(100);
        assert!(pipeline.take_receiver().is_some());
        assert!(pipeline.take_receiver().is_none());
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let mut pipeline = IngestionPipeline::new(10);
        pipeline
            .register_source(Box::new(BurstSource::new("replay", 1)))
            .unwrap();
        let err = pipeline
            .register_source(Box::new(BurstSource::new("replay", 1)))
            .unwrap_err();
        assert!(matches!(err, IngestionError::DuplicateSource { .. }));
    }

    #[test]
    fn test_drop_oldest_keeps_latest_messages() {
        let mut pipeline =
            IngestionPipeline::with_config(BackpressureConfig::new(4, DropPolicy::DropOldest));
        pipeline
            .register_source(Box::new(BurstSource::new("burst", 10)))
            .unwrap();
        let rx = pipeline.take_receiver().unwrap();
        pipeline.start_all();

        assert_eq!(drain(&rx), vec![6.0, 7.0, 8.0, 9.0]);
        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.messages_received, 10);
        assert_eq!(snapshot.messages_dropped, 6);
        assert!(pipeline.all_exhausted());
    }

    #[test]
    fn test_drop_newest_keeps_earliest_messages() {
        let mut pipeline =
            IngestionPipeline::with_config(BackpressureConfig::new(4, DropPolicy::DropNewest));
        pipeline
            .register_source(Box::new(BurstSource::new("burst", 10)))
            .unwrap();
        let rx = pipeline.take_receiver().unwrap();
        pipeline.start_all();

        assert_eq!(drain(&rx), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(pipeline.metrics().snapshot().messages_dropped, 6);
    }

    #[test]
    fn test_close_still_drains_queue() {
        let mut pipeline = IngestionPipeline::new(16);
        pipeline
            .register_source(Box::new(BurstSource::new("burst", 3)))
            .unwrap();
        let rx = pipeline.take_receiver().unwrap();
        pipeline.start_all();
        pipeline.close();

        assert_eq!(drain(&rx), vec![0.0, 1.0, 2.0]);
        assert!(rx.is_closed());
    }
}
