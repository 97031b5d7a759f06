//! FileSink - appends estimates to a JSON lines file

use contracts::{ContractError, DataSink, LiveDelayFrame};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file; parent directories are created
    pub path: PathBuf,
    /// Append to an existing file instead of truncating it
    pub append: bool,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output/live_delay.jsonl"));
        let append = params
            .get("append")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Self { path, append }
    }
}

/// Sink that writes one JSON record per line
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Build from a sink's `params` table (`path`, `append`)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    pub fn path(&self) -> &PathBuf {
        &self.config.path
    }

    fn append_record(&mut self, frame: &LiveDelayFrame) -> std::io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("sink closed"))?;
        serde_json::to_writer(&mut *writer, frame)?;
        writer.write_all(b"\n")
    }

    fn persist_frame(&mut self, frame: &LiveDelayFrame) -> Result<(), ContractError> {
        self.append_record(frame).map_err(|e| {
            error!(sink = %self.name, frame_id = frame.frame_id, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, frame),
        fields(sink = %self.name, frame_id = frame.frame_id)
    )]
    async fn write(&mut self, frame: &LiveDelayFrame) -> Result<(), ContractError> {
        self.persist_frame(frame)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        debug!(sink = %self.name, path = %self.config.path.display(), "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::LiveDelay;
    use tempfile::tempdir;

    fn frame(frame_id: u64) -> LiveDelayFrame {
        LiveDelayFrame {
            frame_id,
            timestamp: frame_id as f64 * 0.05,
            live_delay: LiveDelay::unestimated(0.3),
        }
    }

    #[tokio::test]
    async fn test_file_sink_writes_json_lines() {
        let dir = tempdir().unwrap();
        let config = FileSinkConfig {
            path: dir.path().join("out").join("live_delay.jsonl"),
            append: false,
        };

        let mut sink = FileSink::new("test_file", config.clone()).unwrap();
        sink.write(&frame(0)).await.unwrap();
        sink.write(&frame(5)).await.unwrap();
        sink.close().await.unwrap();

        let content = fs::read_to_string(&config.path).unwrap();
        let records: Vec<LiveDelayFrame> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records, vec![frame(0), frame(5)]);
    }

    #[tokio::test]
    async fn test_file_sink_append_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live_delay.jsonl");
        fs::write(&path, "").unwrap();

        for id in [0, 5] {
            let mut sink = FileSink::new(
                "append",
                FileSinkConfig {
                    path: path.clone(),
                    append: true,
                },
            )
            .unwrap();
            sink.write(&frame(id)).await.unwrap();
            sink.close().await.unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::new(
            "closed",
            FileSinkConfig {
                path: dir.path().join("x.jsonl"),
                append: false,
            },
        )
        .unwrap();
        sink.close().await.unwrap();
        assert!(sink.write(&frame(0)).await.is_err());
    }

    #[test]
    fn test_config_from_params() {
        let params = HashMap::from([
            ("path".to_string(), "/tmp/lagd.jsonl".to_string()),
            ("append".to_string(), "TRUE".to_string()),
        ]);
        let config = FileSinkConfig::from_params(&params);
        assert_eq!(config.path, PathBuf::from("/tmp/lagd.jsonl"));
        assert!(config.append);
    }
}
