//! # Contracts
//!
//! Frozen interface contracts shared by every lagd crate: telemetry
//! messages, the emitted delay record, persisted state, configuration and
//! the sink/source traits. Business crates depend on this crate only;
//! reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Telemetry timestamps are monotonic seconds (`f64`) taken from the bus
//! - Frame ids are assigned by the daemon loop (one per pose message)

mod blueprint;
mod error;
mod estimate;
mod estimator_config;
mod sink;
mod telemetry;
mod telemetry_source;

pub use blueprint::*;
pub use error::*;
pub use estimate::*;
pub use estimator_config::*;
pub use sink::*;
pub use telemetry::*;
pub use telemetry_source::{TelemetryCallback, TelemetrySource};
