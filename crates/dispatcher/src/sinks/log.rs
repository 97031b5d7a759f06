//! Estimates as tracing events

use contracts::{ContractError, DataSink, DelayStatus, LiveDelayFrame};
use tracing::{debug, info, instrument};

/// Estimates between `info` lines while the status is unchanged
const INFO_EVERY: u64 = 20;

/// Logs emitted estimates. Status changes and every `INFO_EVERY`th
/// estimate go out at `info`, the rest at `debug`.
pub struct LogSink {
    name: String,
    last_status: Option<(DelayStatus, bool)>,
    seen: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_status: None,
            seen: 0,
        }
    }

    /// Whether this estimate deserves an `info` line
    fn is_notable(&mut self, frame: &LiveDelayFrame) -> bool {
        let status = (frame.live_delay.status, frame.live_delay.valid);
        let changed = self.last_status.replace(status) != Some(status);
        let periodic = self.seen.is_multiple_of(INFO_EVERY);
        self.seen += 1;
        changed || periodic
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, frame),
        fields(sink = %self.name, frame_id = frame.frame_id)
    )]
    async fn write(&mut self, frame: &LiveDelayFrame) -> Result<(), ContractError> {
        let delay = &frame.live_delay;
        if self.is_notable(frame) {
            info!(
                timestamp = frame.timestamp,
                valid = delay.valid,
                status = delay.status.as_str(),
                lateral_delay = delay.lateral_delay,
                lateral_delay_estimate = delay.lateral_delay_estimate,
                valid_blocks = delay.valid_blocks,
                "LiveDelay"
            );
        } else {
            debug!(
                lateral_delay = delay.lateral_delay,
                lateral_delay_estimate = delay.lateral_delay_estimate,
                "LiveDelay"
            );
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, estimates = self.seen, "LogSink closed");
        Ok(())
    }
}
