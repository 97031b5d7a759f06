//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::SinkReport;
use ingestion::MetricsSnapshot;
use lag_engine::RestoredLag;
use observability::DelayMetricsAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Name of the telemetry source
    pub source: String,

    /// Telemetry messages consumed by the estimator
    pub messages_received: u64,

    /// Messages whose estimate update failed
    pub estimate_errors: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Ingestion counters at shutdown
    pub ingestion: MetricsSnapshot,

    /// Final delivery counters of each sink
    pub sinks: Vec<SinkReport>,

    /// Seed recovered from the param store, if any
    pub restored: Option<RestoredLag>,

    /// Emitted estimate aggregates
    pub delay_metrics: DelayMetricsAggregator,
}

impl PipelineStats {
    /// Telemetry throughput
    pub fn messages_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.messages_received as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of ingested messages dropped by backpressure, as a percentage
    pub fn drop_rate(&self) -> f64 {
        if self.ingestion.messages_received > 0 {
            (self.ingestion.messages_dropped as f64 / self.ingestion.messages_received as f64)
                * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===\n");

        println!("Overview");
        println!("  Source: {}", self.source);
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Messages consumed: {}", self.messages_received);
        println!("  Throughput: {:.1} msg/s", self.messages_per_sec());
        match self.restored {
            Some(restored) => println!(
                "  Restored: lag {:.4} s, {} valid blocks",
                restored.lag, restored.valid_blocks
            ),
            None => println!("  Restored: no"),
        }

        println!("\nIngestion");
        println!("  Received: {}", self.ingestion.messages_received);
        println!(
            "  Dropped: {} ({:.2}%)",
            self.ingestion.messages_dropped,
            self.drop_rate()
        );
        println!("  Decode errors: {}", self.ingestion.decode_errors);
        if self.estimate_errors > 0 {
            println!("  Estimate errors: {}", self.estimate_errors);
        }

        if !self.sinks.is_empty() {
            println!("\nSinks");
            for sink in &self.sinks {
                let m = &sink.metrics;
                println!(
                    "  {}: {} delivered, {} failed, {} dropped (last frame {})",
                    sink.name,
                    m.delivered,
                    m.failed,
                    m.dropped,
                    m.last_delivered_frame
                        .map_or_else(|| "-".to_string(), |id| id.to_string())
                );
            }
        }

        println!("\n{}", self.delay_metrics.summary());
    }
}
