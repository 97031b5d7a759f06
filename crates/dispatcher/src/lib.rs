//! # Dispatcher
//!
//! Output side of the lag daemon.
//!
//! Responsibilities:
//! - Consume emitted `LiveDelayFrame`s
//! - Fan-out to multiple sinks
//! - Isolate slow sinks so they never block the estimator
//! - Persist state across restarts via `ParamStore`

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod params;
pub mod sinks;

pub use contracts::{DataSink, LiveDelayFrame};
pub use dispatcher::{create_dispatcher, Dispatcher};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics, SinkReport};
pub use params::ParamStore;
pub use sinks::{BincodeEstimate, FileSink, LogSink, NetworkFormat, NetworkSink};
