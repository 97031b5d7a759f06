//! Frame assembly driven by pose telemetry.
//!
//! Non-pose messages are latched (latest per kind) until a pose message
//! arrives. The pose closes a frame: the frame counter advances and the
//! latched messages are released in timestamp order, provided every kind has
//! been seen recently enough.

use contracts::{TelemetryKind, TelemetryMessage};
use tracing::trace;

const KIND_COUNT: usize = TelemetryKind::ALL.len();

/// One assembled frame
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledFrame {
    /// Frame counter, starting at 0
    pub frame: u64,
    /// Timestamp of the closing pose message
    pub timestamp: f64,
    /// Every kind seen and none stale
    pub all_checks: bool,
    /// Messages updated since the previous frame, sorted by timestamp.
    /// Empty unless `all_checks` holds.
    pub messages: Vec<TelemetryMessage>,
}

/// Pose-polled telemetry multiplexer
#[derive(Debug, Clone)]
pub struct TelemetryMux {
    poll_kind: TelemetryKind,
    stale_after_sec: f64,
    /// Latest message per kind since the previous frame
    updated: [Option<TelemetryMessage>; KIND_COUNT],
    /// Timestamp of the latest message per kind, ever
    last_seen: [Option<f64>; KIND_COUNT],
    next_frame: u64,
}

impl TelemetryMux {
    /// Mux polled on `live_pose`
    pub fn new(stale_after_sec: f64) -> Self {
        Self::with_poll_kind(TelemetryKind::LivePose, stale_after_sec)
    }

    pub fn with_poll_kind(poll_kind: TelemetryKind, stale_after_sec: f64) -> Self {
        Self {
            poll_kind,
            stale_after_sec,
            updated: Default::default(),
            last_seen: [None; KIND_COUNT],
            next_frame: 0,
        }
    }

    /// Accept one message; returns a frame when `msg` is the poll kind
    pub fn push(&mut self, msg: TelemetryMessage) -> Option<AssembledFrame> {
        let kind = msg.kind();
        let timestamp = msg.timestamp;
        self.last_seen[kind.index()] = Some(timestamp);
        self.updated[kind.index()] = Some(msg);

        if kind != self.poll_kind {
            return None;
        }

        let frame = self.next_frame;
        self.next_frame += 1;

        let all_checks = self.all_checks(timestamp);
        let mut messages: Vec<TelemetryMessage> =
            self.updated.iter_mut().filter_map(Option::take).collect();
        if all_checks {
            messages.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        } else {
            messages.clear();
        }

        trace!(frame, timestamp, all_checks, released = messages.len(), "frame assembled");
        Some(AssembledFrame {
            frame,
            timestamp,
            all_checks,
            messages,
        })
    }

    /// Every kind seen, none older than `stale_after_sec` at `now`
    pub fn all_checks(&self, now: f64) -> bool {
        self.last_seen
            .iter()
            .all(|seen| seen.is_some_and(|t| now - t <= self.stale_after_sec))
    }

    /// Kinds never seen or currently stale at `now`
    pub fn missing_kinds(&self, now: f64) -> Vec<TelemetryKind> {
        TelemetryKind::ALL
            .into_iter()
            .filter(|kind| {
                !self.last_seen[kind.index()].is_some_and(|t| now - t <= self.stale_after_sec)
            })
            .collect()
    }

    /// Frames closed so far
    pub fn frames(&self) -> u64 {
        self.next_frame
    }
}
