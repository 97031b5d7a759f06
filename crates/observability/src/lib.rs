//! # Observability
//!
//! Tracing and Prometheus metrics for the lag daemon.
//!
//! Logging goes through `tracing-subscriber` (JSON, pretty or compact,
//! filtered by `RUST_LOG`). Metrics are emitted with the `metrics` facade
//! from every crate; installing the Prometheus exporter makes them
//! scrapeable and attaches the descriptions in [`METRIC_CATALOGUE`].
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig {
//!     metrics_port: None,
//!     ..Default::default()
//! })?;
//!
//! if let Some(step) = daemon.process(msg)? {
//!     observability::record_live_delay_metrics(&step.frame);
//! }
//! ```

pub mod metrics;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use crate::metrics::{
    record_live_delay_metrics, record_persisted, record_telemetry_received, DelayMetricsAggregator,
    MetricsSummary, RunningStats, StatsSummary,
};

/// Port the exporter listens on when none is configured
pub const DEFAULT_METRICS_PORT: u16 = 9000;

/// JSON logs at `info`, exporter on [`DEFAULT_METRICS_PORT`]
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus listener port; `None` leaves metrics unexported
    pub metrics_port: Option<u16>,
    /// Filter used when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: Some(DEFAULT_METRICS_PORT),
            default_log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, with span context and source location
    #[default]
    Json,
    /// Multi-line, for a terminal
    Pretty,
    /// Single line per event
    Compact,
}

pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    tracing_subscriber::registry()
        .with(format_layer(config.log_format))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_exporter(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// Install only the Prometheus exporter, when tracing is already set up
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_exporter(port)
}

fn format_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}

fn install_exporter(port: u16) -> Result<()> {
    let listen = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .with_context(|| format!("Failed to install Prometheus exporter on {listen}"))?;
    describe_metrics();

    tracing::info!(%listen, metrics = METRIC_CATALOGUE.len(), "Prometheus exporter listening");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Every metric the daemon emits: name, kind, help text
pub const METRIC_CATALOGUE: &[(&str, MetricKind, &str)] = &[
    ("lagd_telemetry_received_total", MetricKind::Counter, "Telemetry messages consumed, by kind"),
    ("lagd_ingestion_received_total", MetricKind::Counter, "Messages accepted by ingestion"),
    ("lagd_ingestion_dropped_total", MetricKind::Counter, "Messages dropped by backpressure"),
    ("lagd_ingestion_decode_errors_total", MetricKind::Counter, "Replay lines that failed to decode"),
    ("lagd_estimate_outcomes_total", MetricKind::Counter, "Correlation attempts, by outcome"),
    ("lagd_correlation_confidence", MetricKind::Histogram, "Peak normalized cross-correlation of accepted estimates"),
    ("lagd_frames_emitted_total", MetricKind::Counter, "LiveDelay frames emitted, by status"),
    ("lagd_invalid_frames_total", MetricKind::Counter, "Emitted frames with stale or missing inputs"),
    ("lagd_lateral_delay_seconds", MetricKind::Gauge, "Trusted lateral delay"),
    ("lagd_lateral_delay_estimate_seconds", MetricKind::Gauge, "Lateral delay including the block being filled"),
    ("lagd_lateral_delay_estimate_hist", MetricKind::Histogram, "Distribution of emitted delay estimates"),
    ("lagd_valid_blocks", MetricKind::Gauge, "Completed estimate blocks"),
    ("lagd_estimated", MetricKind::Gauge, "1 once the delay is learned, else 0"),
    ("lagd_last_frame_id", MetricKind::Gauge, "Frame id of the last emitted estimate"),
    ("lagd_sink_delivered_total", MetricKind::Counter, "Estimates written by a sink, by sink"),
    ("lagd_sink_dropped_total", MetricKind::Counter, "Estimates dropped on a full sink queue, by sink"),
    ("lagd_sink_failures_total", MetricKind::Counter, "Sink write failures, by sink"),
    ("lagd_persisted_total", MetricKind::Counter, "Records written to the param store"),
    ("lagd_last_persisted_frame_id", MetricKind::Gauge, "Frame id of the last persisted record"),
    ("lagd_param_writes_total", MetricKind::Counter, "Param store writes, by result"),
    ("lagd_restore_total", MetricKind::Counter, "Warm-start attempts, by result"),
];

/// Attach help text to every catalogued metric on the installed recorder
pub fn describe_metrics() {
    for &(name, kind, help) in METRIC_CATALOGUE {
        match kind {
            MetricKind::Counter => ::metrics::describe_counter!(name, help),
            MetricKind::Gauge => ::metrics::describe_gauge!(name, help),
            MetricKind::Histogram => ::metrics::describe_histogram!(name, help),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, Some(DEFAULT_METRICS_PORT));
        assert_eq!(config.default_log_level, "info");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_catalogue_names_unique_and_prefixed() {
        let mut seen = HashSet::new();
        for (name, kind, _) in METRIC_CATALOGUE {
            assert!(name.starts_with("lagd_"), "{name}");
            assert!(seen.insert(*name), "duplicate {name}");
            if *kind == MetricKind::Counter {
                assert!(name.ends_with("_total"), "{name}");
            }
        }
    }

    #[test]
    fn test_describe_without_recorder_is_noop() {
        describe_metrics();
    }
}
