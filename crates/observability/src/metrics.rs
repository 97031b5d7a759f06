//! Lag daemon metrics
//!
//! Per-estimate gauges for the Prometheus exporter, plus an in-memory
//! aggregator that summarises a whole run.

use std::collections::BTreeMap;

use contracts::{DelayStatus, LiveDelayFrame};
use metrics::{counter, gauge, histogram};

/// Record metrics for one emitted estimate
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_live_delay_metrics;
///
/// if let Some(step) = daemon.process(msg)? {
///     record_live_delay_metrics(&step.frame);
/// }
/// ```
pub fn record_live_delay_metrics(frame: &LiveDelayFrame) {
    let delay = &frame.live_delay;

    gauge!("lagd_last_frame_id").set(frame.frame_id as f64);
    gauge!("lagd_lateral_delay_estimate_seconds").set(delay.lateral_delay_estimate);
    histogram!("lagd_lateral_delay_estimate_hist").record(delay.lateral_delay_estimate);
    gauge!("lagd_estimated").set(if delay.is_estimated() { 1.0 } else { 0.0 });

    if !delay.valid {
        counter!("lagd_invalid_frames_total").increment(1);
    }
}

/// Record one inbound telemetry message
pub fn record_telemetry_received(kind: &str) {
    counter!("lagd_telemetry_received_total", "kind" => kind.to_string()).increment(1);
}

/// Record a persisted-state write
pub fn record_persisted(frame_id: u64) {
    counter!("lagd_persisted_total").increment(1);
    gauge!("lagd_last_persisted_frame_id").set(frame_id as f64);
}

/// Run-level estimate aggregator
///
/// Aggregates in memory so the CLI can print a summary on shutdown.
#[derive(Debug, Clone, Default)]
pub struct DelayMetricsAggregator {
    /// Emitted estimates
    pub total_frames: u64,

    /// Emitted estimates with every telemetry kind fresh
    pub valid_frames: u64,

    /// Emitted estimates reporting `Estimated`
    pub estimated_frames: u64,

    /// Frame id of the first `Estimated` record
    pub first_estimated_frame: Option<u64>,

    /// Persisted records
    pub persisted: u64,

    /// Highest valid block count seen
    pub max_valid_blocks: usize,

    /// Published lag while `Estimated`
    pub lag_stats: RunningStats,

    /// Last published record
    pub last: Option<LiveDelayFrame>,

    /// Estimate outcomes by name
    pub outcome_counts: BTreeMap<String, u64>,
}

impl DelayMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one emitted estimate
    pub fn update(&mut self, frame: &LiveDelayFrame) {
        let delay = &frame.live_delay;
        self.total_frames += 1;
        if delay.valid {
            self.valid_frames += 1;
        }
        if delay.status == DelayStatus::Estimated {
            self.estimated_frames += 1;
            self.first_estimated_frame.get_or_insert(frame.frame_id);
            self.lag_stats.push(delay.lateral_delay);
        }
        self.max_valid_blocks = self.max_valid_blocks.max(delay.valid_blocks);
        self.last = Some(frame.clone());
    }

    pub fn record_outcome(&mut self, outcome: &str) {
        *self.outcome_counts.entry(outcome.to_string()).or_insert(0) += 1;
    }

    pub fn record_persisted(&mut self) {
        self.persisted += 1;
    }

    pub fn summary(&self) -> MetricsSummary {
        let last = self.last.as_ref().map(|f| &f.live_delay);
        MetricsSummary {
            total_frames: self.total_frames,
            valid_frames: self.valid_frames,
            estimated_frames: self.estimated_frames,
            valid_rate: if self.total_frames > 0 {
                self.valid_frames as f64 / self.total_frames as f64 * 100.0
            } else {
                0.0
            },
            first_estimated_frame: self.first_estimated_frame,
            persisted: self.persisted,
            max_valid_blocks: self.max_valid_blocks,
            final_status: last.map(|d| d.status).unwrap_or_default(),
            final_lateral_delay: last.map(|d| d.lateral_delay),
            lag: StatsSummary::from(&self.lag_stats),
            outcome_counts: self.outcome_counts.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Run summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub valid_frames: u64,
    pub estimated_frames: u64,
    pub valid_rate: f64,
    pub first_estimated_frame: Option<u64>,
    pub persisted: u64,
    pub max_valid_blocks: usize,
    pub final_status: DelayStatus,
    pub final_lateral_delay: Option<f64>,
    pub lag: StatsSummary,
    pub outcome_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Lag Estimate Summary ===")?;
        writeln!(f, "Emitted estimates: {}", self.total_frames)?;
        writeln!(
            f,
            "Valid estimates: {} ({:.2}%)",
            self.valid_frames, self.valid_rate
        )?;
        writeln!(f, "Estimated records: {}", self.estimated_frames)?;
        if let Some(frame) = self.first_estimated_frame {
            writeln!(f, "First estimated at frame: {}", frame)?;
        }
        writeln!(f, "Persisted records: {}", self.persisted)?;
        writeln!(f, "Max valid blocks: {}", self.max_valid_blocks)?;
        match self.final_lateral_delay {
            Some(lag) => writeln!(
                f,
                "Final lateral delay: {:.4} s ({})",
                lag,
                self.final_status.as_str()
            )?,
            None => writeln!(f, "Final lateral delay: N/A")?,
        }
        writeln!(f, "Published lag (s): {}", self.lag)?;

        if !self.outcome_counts.is_empty() {
            writeln!(f, "Estimate outcomes:")?;
            for (outcome, count) in &self.outcome_counts {
                writeln!(f, "  {}: {}", outcome, count)?;
            }
        }

        Ok(())
    }
}

/// Summary of a [`RunningStats`]
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean/variance (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::LiveDelay;

    fn frame(frame_id: u64, status: DelayStatus, lag: f64, valid_blocks: usize) -> LiveDelayFrame {
        LiveDelayFrame {
            frame_id,
            timestamp: frame_id as f64 * 0.05,
            live_delay: LiveDelay {
                valid: frame_id % 10 == 0,
                status,
                lateral_delay: lag,
                lateral_delay_estimate: lag,
                valid_blocks,
                points: None,
            },
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        stats.push(1.0);
        stats.push(2.0);
        stats.push(3.0);
        stats.push(4.0);
        stats.push(5.0);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = DelayMetricsAggregator::new();
        aggregator.update(&frame(0, DelayStatus::Unestimated, 0.3, 0));
        aggregator.update(&frame(5, DelayStatus::Unestimated, 0.3, 3));
        aggregator.update(&frame(10, DelayStatus::Estimated, 0.31, 5));
        aggregator.update(&frame(15, DelayStatus::Estimated, 0.29, 5));
        aggregator.record_outcome("accepted");
        aggregator.record_outcome("accepted");
        aggregator.record_outcome("low_correlation");

        assert_eq!(aggregator.total_frames, 4);
        assert_eq!(aggregator.valid_frames, 2);
        assert_eq!(aggregator.estimated_frames, 2);
        assert_eq!(aggregator.first_estimated_frame, Some(10));
        assert_eq!(aggregator.max_valid_blocks, 5);
        assert!((aggregator.lag_stats.mean() - 0.30).abs() < 1e-12);
        assert_eq!(aggregator.outcome_counts.get("accepted"), Some(&2));

        let summary = aggregator.summary();
        assert_eq!(summary.final_status, DelayStatus::Estimated);
        assert_eq!(summary.final_lateral_delay, Some(0.29));
        assert!((summary.valid_rate - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = DelayMetricsAggregator::new();
        aggregator.update(&frame(0, DelayStatus::Estimated, 0.3, 6));
        aggregator.record_persisted();

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Emitted estimates: 1"));
        assert!(output.contains("100.00%"));
        assert!(output.contains("0.3000 s (estimated)"));
        assert!(output.contains("Persisted records: 1"));
    }

    #[test]
    fn test_empty_summary() {
        let output = format!("{}", DelayMetricsAggregator::new().summary());
        assert!(output.contains("Final lateral delay: N/A"));
        assert!(output.contains("Published lag (s): N/A"));
    }
}
