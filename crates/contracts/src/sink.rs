//! Output side of the daemon: anything that consumes emitted estimates

use crate::{ContractError, LiveDelayFrame};

/// Consumer of emitted `LiveDelayFrame`s
///
/// Each sink runs on its own worker task behind a bounded queue, so
/// `write` may block without stalling the estimator. `flush` and `close`
/// are called once, in that order, when the estimate stream ends.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Label used in logs and metrics
    fn name(&self) -> &str;

    async fn write(&mut self, frame: &LiveDelayFrame) -> Result<(), ContractError>;

    async fn flush(&mut self) -> Result<(), ContractError>;

    async fn close(&mut self) -> Result<(), ContractError>;
}
