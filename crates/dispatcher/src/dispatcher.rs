//! Fan-out of emitted estimates to the configured sinks

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use contracts::{LiveDelayFrame, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::{MetricsSnapshot, SinkReport};
use crate::sinks::{FileSink, LogSink, NetworkSink};

/// Emitted estimates between progress logs (one minute of driving at the
/// default cadence)
const PROGRESS_EVERY: u64 = 240;

/// Owns one `SinkHandle` per configured sink and forwards every estimate
/// it receives to all of them
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<LiveDelayFrame>,
}

impl Dispatcher {
    /// Start a worker for each sink config. Fails on the first sink that
    /// cannot be opened; workers already started are shut down.
    #[instrument(
        name = "dispatcher_from_configs",
        skip(configs, input_rx),
        fields(sink_count = configs.len())
    )]
    pub async fn from_configs(
        configs: &[SinkConfig],
        input_rx: mpsc::Receiver<LiveDelayFrame>,
    ) -> Result<Self, DispatcherError> {
        let mut handles = Vec::with_capacity(configs.len());
        for config in configs {
            match open_sink(config).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in handles {
                        handle.shutdown().await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self::with_handles(handles, input_rx))
    }

    /// Dispatcher over already running handles
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        input_rx: mpsc::Receiver<LiveDelayFrame>,
    ) -> Self {
        Self { handles, input_rx }
    }

    /// Live counters of every sink
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Forward estimates until the input channel closes, then drain every
    /// sink and return their final counters
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> Vec<SinkReport> {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut forwarded: u64 = 0;
        while let Some(frame) = self.input_rx.recv().await {
            forwarded += 1;
            let accepted = self.fan_out(&frame);
            if accepted == 0 && !self.handles.is_empty() {
                warn!(frame_id = frame.frame_id, "No sink accepted the estimate");
            }

            if forwarded.is_multiple_of(PROGRESS_EVERY) {
                debug!(
                    forwarded,
                    frame_id = frame.frame_id,
                    lateral_delay = frame.live_delay.lateral_delay,
                    status = ?frame.live_delay.status,
                    "Dispatcher progress"
                );
            }
        }

        info!(forwarded, "Estimate stream closed, draining sinks");
        let mut reports = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            reports.push(handle.shutdown().await);
        }
        info!("Dispatcher stopped");
        reports
    }

    pub fn spawn(self) -> JoinHandle<Vec<SinkReport>> {
        tokio::spawn(self.run())
    }

    /// Number of sinks whose queue took the estimate
    fn fan_out(&self, frame: &LiveDelayFrame) -> usize {
        self.handles
            .iter()
            .filter(|handle| handle.try_send(frame.clone()))
            .count()
    }
}

#[instrument(
    name = "dispatcher_open_sink",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
async fn open_sink(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    let handle = match config.sink_type {
        SinkType::Log => SinkHandle::spawn(LogSink::new(&config.name), config.queue_capacity),
        SinkType::File => SinkHandle::spawn(
            FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?,
            config.queue_capacity,
        ),
        SinkType::Network => SinkHandle::spawn(
            NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?,
            config.queue_capacity,
        ),
    };
    Ok(handle)
}

/// Dispatcher for `sink_configs` reading estimates from `input_rx`
pub async fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<LiveDelayFrame>,
) -> Result<Dispatcher, DispatcherError> {
    Dispatcher::from_configs(&sink_configs, input_rx).await
}
