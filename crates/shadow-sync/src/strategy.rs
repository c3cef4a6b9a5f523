//! Sync strategy: realtime vs periodic dispatch
//!
//! A `watch::Receiver<SyncStrategy>` lets the worker pool swap between
//! continuous draining and a fixed-interval tick without restarting —
//! pending requests are untouched by a strategy change, only the
//! dispatch cadence changes.

use std::time::Duration;

/// Dispatch cadence for the sync worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Dispatch pops ready queues continuously.
    Realtime,
    /// Dispatch wakes every `delay` and drains all ready queues in one pass.
    Periodic(Duration),
}

impl SyncStrategy {
    /// Parses the configured strategy, defaulting to `Realtime` for
    /// anything unrecognized.
    #[must_use]
    pub fn parse(kind: &str, delay_secs: u64) -> Self {
        match kind {
            "periodic" => Self::Periodic(Duration::from_secs(delay_secs.max(1))),
            _ => Self::Realtime,
        }
    }
}
