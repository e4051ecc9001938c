//! Job entity model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{JobId, ResourceId};
use super::metadata::{self, Metadata};
use super::timestamp;

/// Kind of backend work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Crawl reviews for a resource (crawl, db and image phases).
    ReviewCrawl,
    /// Summarize collected reviews.
    ReviewSummary,
    /// Crawl the resource itself (menu and details).
    #[serde(alias = "restaurant_crawl")]
    ResourceCrawl,
}

impl JobType {
    /// Return the type as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReviewCrawl => "review_crawl",
            Self::ReviewSummary => "review_summary",
            Self::ResourceCrawl => "resource_crawl",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Running (or about to run).
    #[serde(alias = "pending", alias = "running")]
    Active,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped on request.
    Cancelled,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress counters of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobProgress {
    /// Units done.
    #[serde(default)]
    pub current: u64,
    /// Units expected, zero when unknown.
    #[serde(default)]
    pub total: u64,
    /// 0..=100.
    #[serde(default)]
    pub percentage: u32,
}

impl JobProgress {
    /// Build normalized progress: `current` is clamped to `total` when the
    /// total is known, and the percentage is derived when not supplied.
    pub fn new(current: u64, total: u64, percentage: Option<u32>) -> Self {
        let current = if total > 0 { current.min(total) } else { current };
        let percentage = match percentage {
            Some(p) => p.min(100),
            None if total > 0 => ((current.saturating_mul(100)) / total) as u32,
            None => 0,
        };
        Self {
            current,
            total,
            percentage,
        }
    }

    /// Normalize counters that came straight off the wire.
    pub fn normalized(self) -> Self {
        Self::new(self.current, self.total, Some(self.percentage))
    }

    /// Whether the counters say the work is done.
    pub fn is_complete(&self) -> bool {
        self.percentage >= 100 || (self.total > 0 && self.current >= self.total)
    }
}

/// One long-running unit of backend work tied to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique, server-assigned identifier.
    pub job_id: JobId,
    /// Resource (restaurant) the job works on.
    #[serde(rename = "restaurantId", alias = "resourceId", default)]
    pub resource_id: ResourceId,
    /// Kind of work.
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Set while active when a server restart interrupted the job.
    #[serde(default)]
    pub is_interrupted: bool,
    /// Progress counters.
    #[serde(default)]
    pub progress: JobProgress,
    /// Phase and step markers, merged on update.
    #[serde(default, deserialize_with = "metadata::deserialize_lenient")]
    pub metadata: Metadata,
    /// Error message for failed jobs.
    #[serde(default)]
    pub error: Option<String>,
    /// When the job was created.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the job started executing.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A freshly observed active job with no progress yet.
    pub fn active(
        job_id: JobId,
        resource_id: ResourceId,
        job_type: JobType,
        at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            job_id,
            resource_id,
            job_type,
            status: JobStatus::Active,
            is_interrupted: false,
            progress: JobProgress::default(),
            metadata: Metadata::new(),
            error: None,
            created_at: at,
            started_at: at,
            completed_at: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Set or clear the interrupted overlay. Only an active job can be flagged.
    ///
    /// Returns whether the flag changed.
    pub fn set_interrupted(&mut self, interrupted: bool) -> bool {
        let next = interrupted && self.status == JobStatus::Active;
        let changed = self.is_interrupted != next;
        self.is_interrupted = next;
        changed
    }

    /// Move to a terminal status. A job that is already terminal is left alone.
    ///
    /// Returns whether the transition happened.
    pub fn finish(&mut self, status: JobStatus, error: Option<String>, at: DateTime<Utc>) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.is_interrupted = false;
        if status == JobStatus::Failed {
            self.error = error;
        }
        self.completed_at = Some(at);
        true
    }

    /// Repair invariants on a job decoded from a snapshot.
    pub fn normalized(mut self) -> Self {
        self.progress = self.progress.normalized();
        if self.status != JobStatus::Active {
            self.is_interrupted = false;
        }
        self
    }
}
