//! Estimate sinks: tracing log, JSON-lines file, UDP publisher

mod file;
mod log;
mod network;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::network::{BincodeEstimate, NetworkFormat, NetworkSink, NetworkSinkConfig};
