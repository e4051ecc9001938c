//! Sync client metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Client-level metrics counters.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// Text frames received from the channel
    pub frames_received: AtomicU64,
    /// Named events that changed or were checked against local state
    pub events_applied: AtomicU64,
    /// Progress events dropped by the ordering guard
    pub stale_dropped: AtomicU64,
    /// Event names this client does not handle
    pub unknown_events: AtomicU64,
    /// Successful channel connects
    pub connects: AtomicU64,
    /// Channel drops
    pub disconnects: AtomicU64,
    /// Snapshots applied
    pub snapshots_applied: AtomicU64,
    /// Snapshot errors and timeouts
    pub snapshot_failures: AtomicU64,
}

impl SyncMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an inbound frame
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handled event
    pub fn record_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stale drop
    pub fn record_stale(&self) {
        self.stale_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an unhandled event name
    pub fn record_unknown(&self) {
        self.unknown_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connect
    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a disconnect
    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an applied snapshot
    pub fn record_snapshot(&self) {
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed snapshot
    pub fn record_snapshot_failure(&self) {
        self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            unknown_events: self.unknown_events.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            snapshots_applied: self.snapshots_applied.load(Ordering::Relaxed),
            snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Text frames received
    pub frames_received: u64,
    /// Events handled
    pub events_applied: u64,
    /// Stale progress events dropped
    pub stale_dropped: u64,
    /// Unhandled event names
    pub unknown_events: u64,
    /// Successful connects
    pub connects: u64,
    /// Channel drops
    pub disconnects: u64,
    /// Snapshots applied
    pub snapshots_applied: u64,
    /// Snapshot errors and timeouts
    pub snapshot_failures: u64,
}
