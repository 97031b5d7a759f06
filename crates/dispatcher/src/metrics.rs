//! Per-sink delivery counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const NO_FRAME: u64 = u64::MAX;

/// Delivery counters shared between a `SinkHandle` and its worker
#[derive(Debug)]
pub struct SinkMetrics {
    backlog: AtomicUsize,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    last_delivered_frame: AtomicU64,
}

impl Default for SinkMetrics {
    fn default() -> Self {
        Self {
            backlog: AtomicUsize::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_delivered_frame: AtomicU64::new(NO_FRAME),
        }
    }
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimates waiting in the sink queue
    pub fn backlog(&self) -> usize {
        self.backlog.load(Ordering::Relaxed)
    }

    pub fn set_backlog(&self, len: usize) {
        self.backlog.store(len, Ordering::Relaxed);
    }

    /// Estimates the sink accepted
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Estimates the sink rejected with an error
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Estimates discarded because the sink queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frame id of the most recent estimate the sink accepted
    pub fn last_delivered_frame(&self) -> Option<u64> {
        match self.last_delivered_frame.load(Ordering::Relaxed) {
            NO_FRAME => None,
            id => Some(id),
        }
    }

    pub fn record_delivered(&self, frame_id: u64) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.last_delivered_frame.store(frame_id, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            backlog: self.backlog(),
            delivered: self.delivered(),
            failed: self.failed(),
            dropped: self.dropped(),
            last_delivered_frame: self.last_delivered_frame(),
        }
    }
}

/// Point-in-time copy of a sink's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub backlog: usize,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub last_delivered_frame: Option<u64>,
}

impl MetricsSnapshot {
    /// Estimates handed to the sink, whatever their fate
    pub fn offered(&self) -> u64 {
        self.delivered + self.failed + self.dropped
    }
}

/// Final counters of one sink, returned when the dispatcher stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    pub name: String,
    pub metrics: MetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_sink_has_no_delivered_frame() {
        let metrics = SinkMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
        assert_eq!(metrics.last_delivered_frame(), None);
    }

    #[test]
    fn test_delivery_tracks_last_frame() {
        let metrics = SinkMetrics::new();
        metrics.record_delivered(5);
        metrics.record_delivered(10);
        metrics.record_failed();
        metrics.record_dropped();

        let snap = metrics.snapshot();
        assert_eq!(snap.delivered, 2);
        assert_eq!(snap.last_delivered_frame, Some(10));
        assert_eq!(snap.offered(), 4);
    }
}
