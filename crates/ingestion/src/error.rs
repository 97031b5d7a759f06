//! Ingestion error types

use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// A telemetry line could not be decoded
    #[error("failed to decode telemetry from {source_name} line {line}: {message}")]
    DecodeFailed {
        /// Source name
        source_name: String,
        /// 1-based line number
        line: usize,
        /// Error message
        message: String,
    },

    /// Downstream channel closed
    #[error("channel closed for source {source_name}")]
    ChannelClosed {
        /// Source name
        source_name: String,
    },

    /// Source already registered under this name
    #[error("source {source_name} is already registered")]
    DuplicateSource {
        /// Source name
        source_name: String,
    },

    /// Telemetry log could not be opened or read
    #[error("telemetry log {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Ingestion Result alias
pub type Result<T> = std::result::Result<T, IngestionError>;
