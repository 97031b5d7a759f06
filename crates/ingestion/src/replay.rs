//! Telemetry log replay
//!
//! A telemetry log is JSON lines: one [`TelemetryMessage`] per line, sorted
//! by timestamp. Blank lines are skipped; undecodable lines are counted and
//! skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use contracts::{TelemetryCallback, TelemetryMessage, TelemetrySource};
use tracing::{debug, error, info, warn};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};

/// Replay pacing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplayPacing {
    /// As fast as the consumer accepts
    Unpaced,
    /// Log time scaled by this factor (1.0 = real time)
    Speed(f64),
}

/// Replays a JSONL telemetry log on a background thread
pub struct ReplaySource {
    name: String,
    path: PathBuf,
    pacing: ReplayPacing,
    metrics: Option<Arc<IngestionMetrics>>,
    listening: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
}

impl ReplaySource {
    /// Open a replay source over `path`
    ///
    /// # Errors
    /// `Io` if the log cannot be opened.
    pub fn open(path: impl AsRef<Path>, pacing: ReplayPacing) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        File::open(&path).map_err(|source| IngestionError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let name = format!(
            "replay:{}",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        Ok(Self {
            name,
            path,
            pacing,
            metrics: None,
            listening: Arc::new(AtomicBool::new(false)),
            exhausted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Count decode errors into the pipeline's metrics
    pub fn with_metrics(mut self, metrics: Arc<IngestionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TelemetrySource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, callback: TelemetryCallback) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let name = self.name.clone();
        let path = self.path.clone();
        let pacing = self.pacing;
        let metrics = self.metrics.clone();
        let listening = self.listening.clone();
        let exhausted = self.exhausted.clone();

        std::thread::spawn(move || {
            match replay_file(&path, pacing, &listening, metrics.as_deref(), &*callback) {
                Ok(stats) => info!(
                    source = %name,
                    emitted = stats.emitted,
                    decode_errors = stats.decode_errors,
                    "replay finished"
                ),
                Err(e) => error!(source = %name, error = %e, "replay failed"),
            }
            exhausted.store(true, Ordering::SeqCst);
            listening.store(false, Ordering::SeqCst);
        });
    }

    fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            debug!(source = %self.name, "stopping replay");
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }
}

/// Per-run replay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub emitted: u64,
    pub decode_errors: u64,
}

fn replay_file(
    path: &Path,
    pacing: ReplayPacing,
    listening: &AtomicBool,
    metrics: Option<&IngestionMetrics>,
    callback: &(dyn Fn(TelemetryMessage) + Send + Sync),
) -> Result<ReplayStats> {
    let io_err = |source: std::io::Error| IngestionError::Io {
        path: path.display().to_string(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);
    let source_name = path.display().to_string();

    let mut stats = ReplayStats::default();
    let mut clock: Option<(f64, Instant)> = None;

    for (idx, line) in reader.lines().enumerate() {
        if !listening.load(Ordering::Relaxed) {
            debug!(source = %source_name, "replay interrupted");
            break;
        }
        let line = line.map_err(io_err)?;
        let msg = match decode_line(&source_name, idx + 1, &line) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "skipping telemetry line");
                stats.decode_errors += 1;
                if let Some(metrics) = metrics {
                    metrics.record_decode_error();
                }
                continue;
            }
        };

        if let ReplayPacing::Speed(speed) = pacing {
            let (t0, start) = *clock.get_or_insert((msg.timestamp, Instant::now()));
            let due = (msg.timestamp - t0) / speed;
            if due.is_finite() && due > 0.0 {
                if let Some(wait) = Duration::from_secs_f64(due).checked_sub(start.elapsed()) {
                    std::thread::sleep(wait);
                }
            }
        }

        callback(msg);
        stats.emitted += 1;
    }

    Ok(stats)
}

/// Decode one log line; `None` for blank lines
pub fn decode_line(source_name: &str, line_no: usize, line: &str) -> Result<Option<TelemetryMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| IngestionError::DecodeFailed {
            source_name: source_name.to_string(),
            line: line_no,
            message: e.to_string(),
        })
}

/// Read a whole telemetry log, skipping undecodable lines
///
/// # Errors
/// `Io` if the file cannot be read.
pub fn read_telemetry_log(path: impl AsRef<Path>) -> Result<(Vec<TelemetryMessage>, ReplayStats)> {
    let path = path.as_ref();
    let listening = AtomicBool::new(true);
    let collected = Mutex::new(Vec::new());
    let stats = replay_file(path, ReplayPacing::Unpaced, &listening, None, &|msg| {
        if let Ok(mut messages) = collected.lock() {
            messages.push(msg);
        }
    })?;
    let messages = collected.into_inner().unwrap_or_else(|e| e.into_inner());
    Ok((messages, stats))
}

/// Write messages as a telemetry log
///
/// # Errors
/// `Io` if the file cannot be created or written.
pub fn write_telemetry_log<'a>(
    path: impl AsRef<Path>,
    messages: impl IntoIterator<Item = &'a TelemetryMessage>,
) -> Result<usize> {
    let path = path.as_ref();
    let io_err = |source: std::io::Error| IngestionError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    let mut written = 0;
    for msg in messages {
        serde_json::to_writer(&mut writer, msg).map_err(|e| io_err(e.into()))?;
        writer.write_all(b"\n").map_err(io_err)?;
        written += 1;
    }
    writer.flush().map_err(io_err)?;
    Ok(written)
}
