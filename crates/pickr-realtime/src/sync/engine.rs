//! The sync engine: a plain state machine driven by one loop.
//!
//! The engine owns the stores, the ordering guard, the deadline table, the
//! subscription set and the snapshot bookkeeping. It never performs I/O
//! itself: outbound requests go through an [`Outbox`], time comes in as an
//! argument and notifications go to the [`ObserverRegistry`]. Every public
//! mutation ends by publishing a fresh [`SyncView`].

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pickr_core::config::RealtimeConfig;
use pickr_core::events::{SnapshotKind, SyncEvent};
use pickr_core::types::{
    ConnectionState, Job, JobId, JobStatus, QueueId, QueueItem, QueueStats, ResourceId,
};

use crate::channel::SubscriptionMultiplexer;
use crate::connection::handle::Outbox;
use crate::message::envelope::EventFrame;
use crate::message::types::{ClientEvent, ServerEvent};
use crate::metrics::SyncMetrics;
use crate::observer::ObserverRegistry;

use super::bootstrap::SnapshotBootstrapper;
use super::scheduler::{CompletionScheduler, TimerKey};
use super::sequence::SequenceGuard;
use super::store::{JobStore, QueueStore};
use super::view::SyncView;

/// Local state of the job and queue synchronization.
pub struct SyncEngine {
    pub(super) config: RealtimeConfig,
    pub(super) jobs: JobStore,
    pub(super) queue: QueueStore,
    pub(super) guard: SequenceGuard,
    pub(super) scheduler: CompletionScheduler,
    pub(super) subscriptions: SubscriptionMultiplexer,
    pub(super) bootstrap: SnapshotBootstrapper,
    pub(super) outbox: Box<dyn Outbox>,
    pub(super) connection: ConnectionState,
    pub(super) last_error: Option<String>,
    pub(super) metrics: Arc<SyncMetrics>,
    observers: Arc<ObserverRegistry>,
    view_tx: watch::Sender<Arc<SyncView>>,
    changes: Vec<SyncEvent>,
    dirty: bool,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("jobs", &self.jobs.len())
            .field("queue", &self.queue.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("timers", &self.scheduler.len())
            .field("connection", &self.connection)
            .finish()
    }
}

impl SyncEngine {
    /// Creates an engine with empty stores.
    pub fn new(
        config: RealtimeConfig,
        outbox: Box<dyn Outbox>,
        observers: Arc<ObserverRegistry>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let (view_tx, _) = watch::channel(Arc::new(SyncView::default()));
        Self {
            bootstrap: SnapshotBootstrapper::new(config.snapshot_timeout()),
            config,
            jobs: JobStore::new(),
            queue: QueueStore::new(),
            guard: SequenceGuard::new(),
            scheduler: CompletionScheduler::new(),
            subscriptions: SubscriptionMultiplexer::new(),
            outbox,
            connection: ConnectionState::Idle,
            last_error: None,
            metrics,
            observers,
            view_tx,
            changes: Vec::new(),
            dirty: false,
        }
    }

    // ── Read side ────────────────────────────────────────────────

    /// Jobs ordered by creation time.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.list()
    }

    /// Look up one job.
    pub fn job(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    /// Queue entries in display order.
    pub fn queue(&self) -> Vec<QueueItem> {
        self.queue.list()
    }

    /// Look up one queue entry.
    pub fn queue_item(&self, queue_id: &QueueId) -> Option<&QueueItem> {
        self.queue.get(queue_id)
    }

    /// Queue counters.
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Joined resource rooms.
    pub fn subscriptions(&self) -> Vec<ResourceId> {
        self.subscriptions.tracked()
    }

    /// Channel connectivity as last reported.
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Whether a snapshot is outstanding.
    pub fn is_loading(&self) -> bool {
        self.bootstrap.is_loading()
    }

    /// Last surfaced error.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Earliest armed deadline, for the loop to sleep until.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Whether `key` is armed.
    pub fn is_timer_pending(&self, key: &TimerKey) -> bool {
        self.scheduler.is_pending(key)
    }

    /// Latest published view.
    pub fn view(&self) -> Arc<SyncView> {
        self.view_tx.borrow().clone()
    }

    /// Subscribe to view updates.
    pub fn watch_view(&self) -> watch::Receiver<Arc<SyncView>> {
        self.view_tx.subscribe()
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// The channel (re)connected: replay joins and await fresh snapshots.
    pub fn on_connected(&mut self, now: Instant) {
        self.set_connection(ConnectionState::Connected);
        let sent = self.subscriptions.replay(self.outbox.as_ref());
        self.bootstrap.await_snapshots(&mut self.scheduler, now);
        self.dirty = true;
        debug!(sent, "Connect handling complete");
        self.flush();
    }

    /// An established channel dropped; the manager is retrying.
    pub fn on_disconnected(&mut self, reason: &str) {
        info!(reason = %reason, "Sync paused until the channel reconnects");
        if self.connection.is_connected() {
            self.set_connection(ConnectionState::Reconnecting { attempt: 1 });
        }
        self.bootstrap.abandon(&mut self.scheduler);
        self.dirty = true;
        self.flush();
    }

    /// Reconnect attempts are exhausted. Stores are kept but may be stale.
    pub fn on_failed(&mut self, attempts: u32) {
        warn!(attempts, "Event channel unavailable, showing possibly stale state");
        self.set_connection(ConnectionState::Failed);
        self.bootstrap.abandon(&mut self.scheduler);
        self.last_error = Some(format!(
            "event channel unavailable after {attempts} connection attempts"
        ));
        self.dirty = true;
        self.flush();
    }

    /// Mirrors the connection manager's state.
    ///
    /// `Connected` is only entered through [`SyncEngine::on_connected`], so
    /// joins are never issued before the replay.
    pub fn update_connection(&mut self, state: ConnectionState) {
        if state.is_connected() {
            return;
        }
        self.set_connection(state);
        self.flush();
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Joins the room of a resource unless already joined.
    pub fn ensure_subscribed(&mut self, resource_id: ResourceId) -> bool {
        let added = self.subscribe_resource(resource_id);
        self.flush();
        added
    }

    /// Manually requests fresh snapshots. Only possible while connected.
    pub fn refresh(&mut self, now: Instant) -> bool {
        if !self.connection.is_connected() {
            debug!("Refresh skipped while disconnected");
            return false;
        }
        self.bootstrap
            .request(self.outbox.as_ref(), &mut self.scheduler, now);
        self.dirty = true;
        self.flush();
        true
    }

    /// Records that a cancel command was sent for a queue entry.
    pub fn note_cancel_requested(&mut self, queue_id: QueueId) {
        self.changes.push(SyncEvent::CancelRequested { queue_id });
        self.flush();
    }

    /// View teardown: disarms every timer and leaves all rooms.
    pub fn teardown(&mut self) {
        let timers = self.scheduler.clear();
        let outbox = self
            .connection
            .is_connected()
            .then_some(self.outbox.as_ref());
        let rooms = self.subscriptions.unsubscribe_all(outbox);
        self.bootstrap.abandon(&mut self.scheduler);
        info!(timers, rooms, "Sync engine torn down");
        self.dirty = true;
        self.flush();
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Decodes and applies one named frame.
    pub fn handle_frame(&mut self, frame: EventFrame, now: Instant) {
        let name = frame.name.clone();
        match ServerEvent::decode(frame) {
            Ok(Some(event)) => self.apply_event(event, now),
            Ok(None) => {
                self.metrics.record_unknown();
                debug!(event = %name, "Ignoring unhandled event");
            }
            Err(e) => {
                warn!(event = %name, error = %e, "Dropping malformed event");
                let kind = match name.as_str() {
                    "jobs:current_state" => SnapshotKind::Jobs,
                    "queue:current_state" => SnapshotKind::Queue,
                    _ => return,
                };
                // An unreadable snapshot is an answer; stop waiting for it.
                self.snapshot_failed(kind, e.message);
                self.flush();
            }
        }
    }

    /// Fires every deadline due at `now`. Returns how many fired.
    pub fn fire_due(&mut self, now: Instant) -> usize {
        let due = self.scheduler.take_due(now);
        let fired = due.len();
        for key in due {
            match key {
                TimerKey::Completion(job_id) => self.complete_after_grace(&job_id, now),
                TimerKey::Evict(job_id) => {
                    self.guard.reset(&job_id);
                    if self.jobs.evict(&job_id).is_some() {
                        debug!(job_id = %job_id, "Evicted terminal job");
                        self.changes.push(SyncEvent::JobRemoved { job_id });
                    }
                }
                TimerKey::QueuePrune(queue_id) => {
                    if self.queue.prune(&queue_id).is_some() {
                        debug!(queue_id = %queue_id, "Pruned failed queue item");
                        self.changes.push(SyncEvent::QueueItemRemoved { queue_id });
                    }
                }
                TimerKey::SnapshotTimeout(kind) => {
                    let message = format!(
                        "no {} snapshot within {}ms",
                        kind.as_str(),
                        self.config.snapshot_timeout_ms
                    );
                    self.snapshot_failed(kind, message);
                }
            }
        }
        if fired > 0 {
            self.dirty = true;
            self.flush();
        }
        fired
    }

    // ── Internals shared with the router ─────────────────────────

    pub(super) fn subscribe_resource(&mut self, resource_id: ResourceId) -> bool {
        let outbox = self
            .connection
            .is_connected()
            .then_some(self.outbox.as_ref());
        let added = self.subscriptions.ensure_subscribed(resource_id, outbox);
        if added {
            self.changes
                .push(SyncEvent::SubscriptionAdded { resource_id });
            self.dirty = true;
        }
        added
    }

    pub(super) fn emit_live(&self, event: &ClientEvent) -> bool {
        self.connection.is_connected() && self.outbox.emit(event)
    }

    pub(super) fn snapshot_failed(&mut self, kind: SnapshotKind, message: String) {
        self.bootstrap.fail(kind, &message, &mut self.scheduler);
        self.metrics.record_snapshot_failure();
        self.last_error = Some(message.clone());
        self.changes.push(SyncEvent::SnapshotFailed { kind, message });
        self.dirty = true;
    }

    pub(super) fn touch(&mut self) {
        self.dirty = true;
    }

    pub(super) fn push(&mut self, event: SyncEvent) {
        self.changes.push(event);
        self.dirty = true;
    }

    fn complete_after_grace(&mut self, job_id: &JobId, now: Instant) {
        match self
            .jobs
            .mark_terminal(job_id, JobStatus::Completed, None, Utc::now())
        {
            Some(job) => {
                info!(job_id = %job_id, "Job completed after grace window");
                self.guard.reset(job_id);
                self.scheduler.schedule_after(
                    TimerKey::Evict(job_id.clone()),
                    now,
                    self.config.terminal_retention(),
                );
                self.changes.push(SyncEvent::JobUpdated { job });
            }
            None => debug!(job_id = %job_id, "Completion timer found no active job"),
        }
    }

    fn set_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            self.connection = state;
            self.changes.push(SyncEvent::ConnectionChanged { state });
            self.dirty = true;
        }
    }

    /// Delivers queued notifications and publishes a new view.
    pub(super) fn flush(&mut self) {
        if !self.dirty && self.changes.is_empty() {
            return;
        }
        self.dirty = false;
        let view = SyncView {
            jobs: self.jobs.list(),
            queue: self.queue.list(),
            stats: self.queue.stats(),
            connection: self.connection,
            loading: self.bootstrap.is_loading(),
            last_error: self.last_error.clone(),
            subscriptions: self.subscriptions.tracked(),
            updated_at: Some(Utc::now()),
        };
        self.view_tx.send_replace(Arc::new(view));
        for event in std::mem::take(&mut self.changes) {
            self.observers.notify(&event);
        }
    }
}
