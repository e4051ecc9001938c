//! Immutable read model published to consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pickr_core::types::{
    ConnectionState, Job, JobId, JobStatus, QueueItem, QueueStats, ResourceId,
};

/// Point-in-time view of the synchronized state.
///
/// A new view is published after every batch of mutations; consumers never
/// see a half-applied event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncView {
    /// Jobs ordered by creation time.
    pub jobs: Vec<Job>,
    /// Queue entries: processing, waiting by position, failed.
    pub queue: Vec<QueueItem>,
    /// Queue counters.
    pub stats: QueueStats,
    /// Channel connectivity.
    pub connection: ConnectionState,
    /// Whether a snapshot is outstanding.
    pub loading: bool,
    /// Last surfaced error (snapshot failure, exhausted reconnects).
    pub last_error: Option<String>,
    /// Joined resource rooms.
    pub subscriptions: Vec<ResourceId>,
    /// When the view was built.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SyncView {
    /// Look up a job.
    pub fn job(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.job_id == job_id)
    }

    /// Jobs still running.
    pub fn active_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|job| job.status == JobStatus::Active)
    }

    /// Jobs of one resource.
    pub fn jobs_for(&self, resource_id: ResourceId) -> impl Iterator<Item = &Job> {
        self.jobs
            .iter()
            .filter(move |job| job.resource_id == resource_id)
    }

    /// Whether the view may be out of date.
    pub fn is_stale(&self) -> bool {
        !self.connection.is_connected()
    }
}
