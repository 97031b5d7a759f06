//! One queue and one worker task per sink, so a slow or failing sink only
//! ever loses its own estimates

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::{DataSink, LiveDelayFrame};

use crate::metrics::{SinkMetrics, SinkReport};

/// Producer side of a running sink
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<LiveDelayFrame>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    /// Start a worker that owns `sink` and drains a queue of
    /// `queue_capacity` estimates
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity);
        let metrics = Arc::new(SinkMetrics::new());

        let worker = SinkWorker {
            name: name.clone(),
            sink,
            rx,
            metrics: Arc::clone(&metrics),
            failing_since: None,
        };

        Self {
            name,
            tx,
            metrics,
            worker: tokio::spawn(worker.run()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue an estimate without waiting. A full queue drops the estimate
    /// and returns false.
    pub fn try_send(&self, frame: LiveDelayFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.metrics
                    .set_backlog(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.metrics.record_dropped();
                counter!("lagd_sink_dropped_total", "sink" => self.name.clone()).increment(1);
                warn!(sink = %self.name, frame_id = frame.frame_id, "Sink queue full, estimate dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(frame)) => {
                error!(sink = %self.name, frame_id = frame.frame_id, "Sink worker is gone");
                false
            }
        }
    }

    /// Close the queue, wait for the worker to drain it, and report the
    /// sink's final counters
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> SinkReport {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(sink = %self.name, error = ?e, "Sink worker panicked");
        }
        let metrics = self.metrics.snapshot();
        debug!(
            sink = %self.name,
            delivered = metrics.delivered,
            last_frame = ?metrics.last_delivered_frame,
            "Sink drained"
        );
        SinkReport {
            name: self.name,
            metrics,
        }
    }
}

struct SinkWorker<S> {
    name: String,
    sink: S,
    rx: mpsc::Receiver<LiveDelayFrame>,
    metrics: Arc<SinkMetrics>,
    /// Frame id of the first write in the current run of failures
    failing_since: Option<u64>,
}

impl<S: DataSink> SinkWorker<S> {
    #[instrument(name = "sink_worker", skip(self), fields(sink = %self.name))]
    async fn run(mut self) {
        debug!("Sink worker started");

        while let Some(frame) = self.rx.recv().await {
            self.metrics.set_backlog(self.rx.len());
            match self.sink.write(&frame).await {
                Ok(()) => self.delivered(frame.frame_id),
                Err(e) => self.failed(frame.frame_id, &e),
            }
        }

        if let Err(e) = self.sink.flush().await {
            error!(error = %e, "Flush failed on shutdown");
        }
        if let Err(e) = self.sink.close().await {
            error!(error = %e, "Close failed on shutdown");
        }
        debug!("Sink worker stopped");
    }

    fn delivered(&mut self, frame_id: u64) {
        self.metrics.record_delivered(frame_id);
        counter!("lagd_sink_delivered_total", "sink" => self.name.clone()).increment(1);
        if let Some(first) = self.failing_since.take() {
            info!(since_frame = first, frame_id, "Sink recovered");
        }
    }

    /// Only the first failure of a run is logged at error level; a broken
    /// sink would otherwise log every estimate.
    fn failed(&mut self, frame_id: u64, e: &contracts::ContractError) {
        self.metrics.record_failed();
        counter!("lagd_sink_failures_total", "sink" => self.name.clone()).increment(1);
        if self.failing_since.is_none() {
            self.failing_since = Some(frame_id);
            error!(frame_id, error = %e, "Sink write failed");
        } else {
            debug!(frame_id, error = %e, "Sink write failed again");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, LiveDelay};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    fn frame(i: u64) -> LiveDelayFrame {
        LiveDelayFrame {
            frame_id: i * 5,
            timestamp: i as f64 * 0.25,
            live_delay: LiveDelay::unestimated(0.3),
        }
    }

    /// Sink whose writes succeed or fail following a script; writes past the
    /// end of the script succeed
    struct ScriptedSink {
        name: &'static str,
        script: VecDeque<bool>,
        written: Arc<AtomicU64>,
        latency: Duration,
    }

    impl ScriptedSink {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                script: VecDeque::new(),
                written: Arc::new(AtomicU64::new(0)),
                latency: Duration::ZERO,
            }
        }
    }

    impl DataSink for ScriptedSink {
        fn name(&self) -> &str {
            self.name
        }

        async fn write(&mut self, _frame: &LiveDelayFrame) -> Result<(), ContractError> {
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            if !self.script.pop_front().unwrap_or(true) {
                return Err(ContractError::sink_write(self.name, "scripted failure"));
            }
            self.written.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let sink = ScriptedSink::new("jsonl");
        let written = Arc::clone(&sink.written);
        let handle = SinkHandle::spawn(sink, 10);

        for i in 0..5 {
            assert!(handle.try_send(frame(i)));
        }

        let report = handle.shutdown().await;
        assert_eq!(written.load(Ordering::Relaxed), 5);
        assert_eq!(report.name, "jsonl");
        assert_eq!(report.metrics.delivered, 5);
        assert_eq!(report.metrics.last_delivered_frame, Some(20));
    }

    #[tokio::test]
    async fn test_slow_sink_drops_on_full_queue() {
        let mut sink = ScriptedSink::new("slow");
        sink.latency = Duration::from_millis(100);
        let handle = SinkHandle::spawn(sink, 2);

        let accepted = (0..10).filter(|&i| handle.try_send(frame(i))).count() as u64;

        assert!(handle.metrics().dropped() > 0);
        let report = handle.shutdown().await;
        assert_eq!(report.metrics.delivered, accepted);
        assert_eq!(report.metrics.offered(), 10);
    }

    #[tokio::test]
    async fn test_failures_counted_and_sink_recovers() {
        let mut sink = ScriptedSink::new("flaky");
        sink.script = VecDeque::from([false, false, true]);
        let handle = SinkHandle::spawn(sink, 10);

        for i in 0..4 {
            handle.try_send(frame(i));
        }
        sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.metrics().failed(), 2);

        let report = handle.shutdown().await;
        assert_eq!(report.metrics.delivered, 2);
        assert_eq!(report.metrics.last_delivered_frame, Some(15));
    }
}
