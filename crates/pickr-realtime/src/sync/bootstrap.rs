//! Snapshot bootstrapping after connect and on manual refresh.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use pickr_core::events::SnapshotKind;

use crate::connection::handle::Outbox;
use crate::message::types::ClientEvent;

use super::scheduler::{CompletionScheduler, TimerKey};

const KINDS: [SnapshotKind; 2] = [SnapshotKind::Jobs, SnapshotKind::Queue];

/// Tracks outstanding `*:current_state` requests.
///
/// On connect the global room joins double as the snapshot requests, so
/// [`SnapshotBootstrapper::await_snapshots`] only arms the answer timeouts.
/// A manual [`SnapshotBootstrapper::request`] re-sends the joins itself.
/// Failures are never retried automatically.
#[derive(Debug)]
pub struct SnapshotBootstrapper {
    /// How long to wait for an answer.
    timeout: Duration,
    /// Snapshots requested and not yet answered.
    pending: BTreeSet<SnapshotKind>,
}

impl SnapshotBootstrapper {
    /// Creates an idle bootstrapper.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: BTreeSet::new(),
        }
    }

    /// Marks both snapshots as requested and arms their timeouts.
    pub fn await_snapshots(&mut self, scheduler: &mut CompletionScheduler, now: Instant) {
        for kind in KINDS {
            self.pending.insert(kind);
            scheduler.schedule_after(TimerKey::SnapshotTimeout(kind), now, self.timeout);
        }
        info!(timeout_ms = self.timeout.as_millis() as u64, "Awaiting snapshots");
    }

    /// Sends fresh snapshot requests. Returns how many were sent.
    pub fn request(
        &mut self,
        outbox: &dyn Outbox,
        scheduler: &mut CompletionScheduler,
        now: Instant,
    ) -> usize {
        let sent = [ClientEvent::SubscribeAllJobs, ClientEvent::SubscribeQueue]
            .iter()
            .filter(|event| outbox.emit(event))
            .count();
        self.await_snapshots(scheduler, now);
        sent
    }

    /// Records an answer. Returns whether it was awaited.
    pub fn resolve(&mut self, kind: SnapshotKind, scheduler: &mut CompletionScheduler) -> bool {
        scheduler.cancel(&TimerKey::SnapshotTimeout(kind));
        self.pending.remove(&kind)
    }

    /// Records a failure (error answer or timeout). Prior state stays untouched.
    pub fn fail(
        &mut self,
        kind: SnapshotKind,
        message: &str,
        scheduler: &mut CompletionScheduler,
    ) -> bool {
        scheduler.cancel(&TimerKey::SnapshotTimeout(kind));
        let awaited = self.pending.remove(&kind);
        warn!(snapshot = kind.as_str(), error = %message, "Snapshot failed");
        awaited
    }

    /// Forgets outstanding requests, e.g. when the channel drops.
    pub fn abandon(&mut self, scheduler: &mut CompletionScheduler) {
        for kind in std::mem::take(&mut self.pending) {
            scheduler.cancel(&TimerKey::SnapshotTimeout(kind));
        }
    }

    /// Whether any snapshot is outstanding.
    pub fn is_loading(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether `kind` is outstanding.
    pub fn is_pending(&self, kind: SnapshotKind) -> bool {
        self.pending.contains(&kind)
    }
}
