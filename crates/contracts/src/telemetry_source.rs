//! TelemetrySource trait - inbound telemetry abstraction
//!
//! Decouples telemetry producers (log replay, synthetic drives) from the
//! ingestion pipeline that consumes them.

use std::sync::Arc;

use crate::TelemetryMessage;

/// Telemetry callback type
///
/// Sources push every decoded `TelemetryMessage` through this callback.
pub type TelemetryCallback = Arc<dyn Fn(TelemetryMessage) + Send + Sync>;

/// Telemetry source trait
///
/// A source emits messages of any of the five kinds, in timestamp order.
///
/// # Example
///
/// ```ignore
/// let source: Box<dyn TelemetrySource> = get_source();
/// source.listen(Arc::new(|msg| {
///     println!("{} @ {}", msg.kind(), msg.timestamp);
/// }));
/// // ...
/// source.stop();
/// ```
pub trait TelemetrySource: Send + Sync {
    /// Source name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Start emitting messages into `callback`.
    ///
    /// Calling `listen` on a source that is already listening is a no-op.
    fn listen(&self, callback: TelemetryCallback);

    /// Stop emitting messages
    fn stop(&self);

    /// Check if currently listening
    fn is_listening(&self) -> bool;

    /// Whether the source has emitted everything it will ever emit
    fn is_exhausted(&self) -> bool {
        false
    }
}
