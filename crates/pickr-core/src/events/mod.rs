//! Change notifications emitted by the sync engine.
//!
//! Events are dispatched through the observer registry and consumed by
//! rendering collaborators (CLI tables, the headless monitor log).

use serde::{Deserialize, Serialize};

use crate::types::{ConnectionState, Job, JobId, QueueId, QueueItem, ResourceId};

/// Which authoritative full-state payload a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// `jobs:current_state`.
    Jobs,
    /// `queue:current_state`.
    Queue,
}

impl SnapshotKind {
    /// Return the kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::Queue => "queue",
        }
    }
}

/// Union of all change notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Connectivity changed.
    ConnectionChanged {
        /// New state.
        state: ConnectionState,
    },
    /// The job store was replaced by a snapshot.
    JobsReplaced {
        /// Jobs in the new snapshot.
        count: usize,
    },
    /// A job was created or changed.
    JobUpdated {
        /// The job after the change.
        job: Job,
    },
    /// A job left the store.
    JobRemoved {
        /// The removed job.
        job_id: JobId,
    },
    /// The queue store was replaced by a snapshot.
    QueueReplaced {
        /// Entries in the new snapshot.
        count: usize,
    },
    /// A queue entry was created or changed.
    QueueUpdated {
        /// The entry after the change.
        item: QueueItem,
    },
    /// A queue entry left the store.
    QueueItemRemoved {
        /// The removed entry.
        queue_id: QueueId,
    },
    /// A resource room was joined for the first time.
    SubscriptionAdded {
        /// The resource.
        resource_id: ResourceId,
    },
    /// A snapshot request failed or timed out; stores were left untouched.
    SnapshotFailed {
        /// Which snapshot.
        kind: SnapshotKind,
        /// Error description.
        message: String,
    },
    /// A cancel command was sent for a queue entry.
    CancelRequested {
        /// The entry.
        queue_id: QueueId,
    },
}

impl SyncEvent {
    /// Short label for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionChanged { .. } => "connection_changed",
            Self::JobsReplaced { .. } => "jobs_replaced",
            Self::JobUpdated { .. } => "job_updated",
            Self::JobRemoved { .. } => "job_removed",
            Self::QueueReplaced { .. } => "queue_replaced",
            Self::QueueUpdated { .. } => "queue_updated",
            Self::QueueItemRemoved { .. } => "queue_item_removed",
            Self::SubscriptionAdded { .. } => "subscription_added",
            Self::SnapshotFailed { .. } => "snapshot_failed",
            Self::CancelRequested { .. } => "cancel_requested",
        }
    }
}
