//! Event router: dispatches decoded server events to their handlers.
//!
//! Progress events pass the sequence guard first. Explicit terminal events
//! bypass the completion grace window and reset the job's ordinal space.

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use pickr_core::events::{SnapshotKind, SyncEvent};
use pickr_core::types::{JobId, JobStatus, JobType};

use crate::message::types::{
    ClientEvent, JobAnnouncement, JobsSnapshot, ProgressPayload, ProgressPhase,
    QueueEventPayload, QueueSnapshot, ServerEvent,
};

use super::engine::SyncEngine;
use super::scheduler::TimerKey;
use super::sequence::{Ordinal, Verdict};
use super::store::ProgressOutcome;

impl SyncEngine {
    /// Applies one decoded server event, then publishes the result.
    pub fn apply_event(&mut self, event: ServerEvent, now: Instant) {
        trace!(event = event.kind(), job_id = ?event.job_id(), "Applying event");
        self.metrics.record_applied();
        match event {
            ServerEvent::JobsCurrentState(snapshot) => self.apply_jobs_snapshot(snapshot, now),
            ServerEvent::JobsError(error) => {
                self.snapshot_failed(SnapshotKind::Jobs, error.describe());
            }
            ServerEvent::JobNew(announcement) => self.on_job_new(&announcement),
            ServerEvent::Progress {
                family,
                phase,
                payload,
            } => self.on_progress(family, phase, &payload, now),
            ServerEvent::Completed { payload, .. } => {
                self.on_terminal(&payload.job_id, JobStatus::Completed, None, now);
            }
            ServerEvent::Failed { payload, .. } => {
                let error = payload.error.or_else(|| Some("unknown error".to_string()));
                self.on_terminal(&payload.job_id, JobStatus::Failed, error, now);
            }
            ServerEvent::Cancelled { payload, .. } => {
                self.on_terminal(&payload.job_id, JobStatus::Cancelled, None, now);
            }
            ServerEvent::QueueCurrentState(snapshot) => self.apply_queue_snapshot(snapshot, now),
            ServerEvent::QueueJobAdded(payload) => self.on_queue_added(&payload),
            ServerEvent::QueueJobStarted(payload) => {
                if let Some(item) = self.queue.start(&payload) {
                    self.push(SyncEvent::QueueUpdated { item });
                }
            }
            ServerEvent::QueueJobCompleted(payload) => {
                self.scheduler
                    .cancel(&TimerKey::QueuePrune(payload.queue_id.clone()));
                match self.queue.complete(&payload.queue_id) {
                    Some(item) => self.push(SyncEvent::QueueItemRemoved {
                        queue_id: item.queue_id,
                    }),
                    // Counters still moved.
                    None => self.touch(),
                }
            }
            ServerEvent::QueueJobFailed(payload) => self.on_queue_failed(&payload, now),
            ServerEvent::QueueJobCancelled(payload) => {
                self.scheduler
                    .cancel(&TimerKey::QueuePrune(payload.queue_id.clone()));
                match self.queue.cancel(&payload.queue_id) {
                    Some(item) => self.push(SyncEvent::QueueItemRemoved {
                        queue_id: item.queue_id,
                    }),
                    // Counters still moved.
                    None => self.touch(),
                }
            }
        }
        self.flush();
    }

    // ── Jobs ─────────────────────────────────────────────────────

    fn apply_jobs_snapshot(&mut self, snapshot: JobsSnapshot, now: Instant) {
        let JobsSnapshot {
            jobs, resource_ids, ..
        } = snapshot;
        let count = self.jobs.replace_all(jobs);

        // Ordinals and timers of jobs that are no longer active belong to
        // the previous epoch.
        let active = self.jobs.active_ids();
        self.guard.retain(|id| active.contains(id));
        self.scheduler.retain(|key| match key {
            TimerKey::Completion(id) => active.contains(id),
            TimerKey::Evict(_) => false,
            _ => true,
        });
        for job_id in self.jobs.terminal_ids() {
            self.scheduler.schedule_after(
                TimerKey::Evict(job_id),
                now,
                self.config.terminal_retention(),
            );
        }

        let mut resources = self.jobs.resource_ids();
        resources.extend(resource_ids);
        for resource_id in resources {
            self.subscribe_resource(resource_id);
        }

        self.bootstrap.resolve(SnapshotKind::Jobs, &mut self.scheduler);
        self.metrics.record_snapshot();
        self.last_error = None;
        info!(jobs = count, "Applied jobs snapshot");
        self.push(SyncEvent::JobsReplaced { count });
    }

    fn on_job_new(&mut self, announcement: &JobAnnouncement) {
        self.subscribe_resource(announcement.resource_id);
        match self.jobs.announce(announcement) {
            Some(job) => {
                debug!(job_id = %job.job_id, resource_id = job.resource_id, "Job announced");
                self.push(SyncEvent::JobUpdated { job });
            }
            None => trace!(job_id = %announcement.job_id, "Announcement for known job"),
        }
    }

    fn on_progress(
        &mut self,
        family: JobType,
        phase: ProgressPhase,
        payload: &ProgressPayload,
        now: Instant,
    ) {
        let job_id = &payload.job_id;
        if self.jobs.is_terminal(job_id) {
            trace!(job_id = %job_id, "Progress for terminal job ignored");
            return;
        }

        let ordinal = Ordinal::of(payload, phase);
        if let Verdict::Stale { last } = self.guard.check(job_id, ordinal) {
            self.metrics.record_stale();
            warn!(
                job_id = %job_id,
                phase = phase.as_str(),
                ordinal = ?ordinal,
                last,
                "Dropping out-of-order progress event"
            );
            return;
        }

        let job = match self.jobs.apply_progress(family, phase, payload) {
            ProgressOutcome::Applied { job, created } => {
                if created {
                    debug!(job_id = %job_id, job_type = %family, "Job first seen via progress");
                }
                job
            }
            ProgressOutcome::Ignored => return,
        };

        let completion = TimerKey::Completion(job_id.clone());
        if job.progress.is_complete() {
            self.scheduler
                .schedule_after(completion, now, self.config.completion_grace());
            debug!(job_id = %job_id, "Completion scheduled after grace window");
        } else if self.scheduler.cancel(&completion) {
            debug!(job_id = %job_id, "Progress resumed, pending completion cancelled");
        }
        self.push(SyncEvent::JobUpdated { job });
    }

    fn on_terminal(
        &mut self,
        job_id: &JobId,
        status: JobStatus,
        error: Option<String>,
        now: Instant,
    ) {
        self.scheduler.cancel(&TimerKey::Completion(job_id.clone()));
        self.guard.reset(job_id);

        match self.jobs.mark_terminal(job_id, status, error, Utc::now()) {
            Some(job) => {
                info!(job_id = %job_id, status = %status, "Job reached terminal state");
                self.scheduler.schedule_after(
                    TimerKey::Evict(job_id.clone()),
                    now,
                    self.config.terminal_retention(),
                );
                self.push(SyncEvent::JobUpdated { job });
            }
            None => debug!(job_id = %job_id, status = %status, "Terminal event for unknown or finished job"),
        }
    }

    // ── Queue ────────────────────────────────────────────────────

    fn apply_queue_snapshot(&mut self, snapshot: QueueSnapshot, now: Instant) {
        let failed = self.queue.replace_all(snapshot.queue, snapshot.stats);
        self.scheduler
            .retain(|key| !matches!(key, TimerKey::QueuePrune(_)));
        for queue_id in failed {
            self.scheduler.schedule_after(
                TimerKey::QueuePrune(queue_id),
                now,
                self.config.completion_grace(),
            );
        }

        self.bootstrap
            .resolve(SnapshotKind::Queue, &mut self.scheduler);
        self.metrics.record_snapshot();
        let count = self.queue.len();
        info!(items = count, "Applied queue snapshot");
        self.push(SyncEvent::QueueReplaced { count });
    }

    fn on_queue_added(&mut self, payload: &QueueEventPayload) {
        if let Some(item) = self.queue.insert_added(payload) {
            self.push(SyncEvent::QueueUpdated { item });
        }
        // Counters are re-synced from the server's answer.
        if !self.emit_live(&ClientEvent::SubscribeQueue) {
            debug!(queue_id = %payload.queue_id, "Queue refresh not sent");
        }
    }

    fn on_queue_failed(&mut self, payload: &QueueEventPayload, now: Instant) {
        if let Some(item) = self.queue.fail(payload, Utc::now()) {
            warn!(
                queue_id = %item.queue_id,
                error = item.error.as_deref().unwrap_or("unknown"),
                "Queue item failed"
            );
            self.scheduler.schedule_after(
                TimerKey::QueuePrune(item.queue_id.clone()),
                now,
                self.config.completion_grace(),
            );
            self.push(SyncEvent::QueueUpdated { item });
        }
    }
}
