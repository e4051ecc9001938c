//! Work queue entries and statistics.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{JobId, QueueId, ResourceId};
use super::job::JobType;
use super::metadata::{self, Metadata};
use super::timestamp;

/// Position of an entry in the backend FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Queued, not picked up yet.
    Waiting,
    /// Picked up by the queue worker.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Removed on request.
    Cancelled,
}

impl QueueStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed | Self::Cancelled => 2,
        }
    }

    /// Check if the entry is finished.
    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Transitions only move forward along `waiting → processing → terminal`.
    pub fn can_advance_to(&self, next: QueueStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the backend work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Unique queue entry identifier.
    pub queue_id: QueueId,
    /// Job materialized for this entry, once processing started.
    #[serde(default)]
    pub job_id: Option<JobId>,
    /// Kind of work.
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Resource (restaurant) the entry works on.
    #[serde(rename = "restaurantId", alias = "resourceId", default)]
    pub resource_id: ResourceId,
    /// Free-form scalar markers.
    #[serde(default, deserialize_with = "metadata::deserialize_lenient")]
    pub metadata: Metadata,
    /// Queue lifecycle status.
    #[serde(alias = "status")]
    pub queue_status: QueueStatus,
    /// When the entry was queued.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub queued_at: Option<DateTime<Utc>>,
    /// When processing started.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the entry finished.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message for failed entries.
    #[serde(default)]
    pub error: Option<String>,
    /// 1-based position; meaningful only while waiting.
    #[serde(default)]
    pub position: Option<u32>,
}

impl QueueItem {
    /// Advance the status if the transition moves forward.
    ///
    /// Returns whether the transition happened.
    pub fn advance(&mut self, next: QueueStatus, at: Option<DateTime<Utc>>) -> bool {
        if !self.queue_status.can_advance_to(next) {
            return false;
        }
        self.queue_status = next;
        match next {
            QueueStatus::Processing => {
                self.started_at = at.or(self.started_at);
                self.position = None;
            }
            s if s.is_terminal() => {
                self.completed_at = at.or(self.completed_at);
                self.position = None;
            }
            _ => {}
        }
        true
    }
}

/// Aggregate counters reported with the queue snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Entries known to the server.
    #[serde(default)]
    pub total: u64,
    /// Entries waiting.
    #[serde(default)]
    pub waiting: u64,
    /// Entries processing.
    #[serde(default)]
    pub processing: u64,
    /// Entries completed.
    #[serde(default)]
    pub completed: u64,
    /// Entries failed.
    #[serde(default)]
    pub failed: u64,
    /// Entries cancelled.
    #[serde(default)]
    pub cancelled: u64,
}
