//! Inbound and outbound named event definitions.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pickr_core::error::AppError;
use pickr_core::result::AppResult;
use pickr_core::types::metadata::{self, Metadata};
use pickr_core::types::timestamp;
use pickr_core::types::{
    Job, JobId, JobType, QueueId, QueueItem, QueueStats, QueueStatus, ResourceId,
};

use super::envelope::EventFrame;

/// Events sent by the client to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEvent {
    /// Join the global jobs room; answered with `jobs:current_state`.
    SubscribeAllJobs,
    /// Leave the global jobs room (view teardown).
    UnsubscribeAllJobs,
    /// Join the room of one resource.
    SubscribeRestaurant(ResourceId),
    /// Join the queue room; answered with `queue:current_state`.
    SubscribeQueue,
}

impl ClientEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubscribeAllJobs => "subscribe:all_jobs",
            Self::UnsubscribeAllJobs => "unsubscribe:all_jobs",
            Self::SubscribeRestaurant(_) => "subscribe:restaurant",
            Self::SubscribeQueue => "subscribe:queue",
        }
    }

    /// Frame to put on the wire.
    pub fn to_frame(&self) -> EventFrame {
        let data = match self {
            Self::SubscribeRestaurant(id) => Value::from(*id),
            _ => Value::Null,
        };
        EventFrame::new(self.name(), data)
    }
}

/// Ordering phase of a progress event. Phases have independent counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    /// Fetching reviews from the source site.
    Crawl,
    /// Writing reviews into the database.
    Db,
    /// Downloading review images.
    Image,
    /// Summarizing reviews.
    Summary,
    /// Crawling the menu.
    Menu,
}

impl ProgressPhase {
    /// Return the phase as a lowercase string (also the `metadata.phase` value).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Db => "db",
            Self::Image => "image",
            Self::Summary => "summary",
            Self::Menu => "menu",
        }
    }
}

/// `jobs:current_state` payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsSnapshot {
    /// Number of jobs reported by the server.
    #[serde(default)]
    pub total: u64,
    /// Every job the server currently tracks.
    #[serde(default)]
    pub jobs: Vec<Job>,
    /// Resources with live jobs.
    #[serde(default, alias = "restaurantIds")]
    pub resource_ids: Vec<ResourceId>,
    /// Server time of the snapshot.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// `jobs:error` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProtocolErrorPayload {
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Underlying error, as sent.
    #[serde(default)]
    pub error: Option<Value>,
}

impl ProtocolErrorPayload {
    /// One-line description combining both fields.
    pub fn describe(&self) -> String {
        match &self.error {
            Some(Value::String(e)) if !e.is_empty() => format!("{}: {e}", self.message),
            Some(Value::Null) | None => self.message.clone(),
            Some(other) => format!("{}: {other}", self.message),
        }
    }
}

/// `job:new` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAnnouncement {
    /// The new job.
    pub job_id: JobId,
    /// Kind of work, when announced.
    #[serde(default, rename = "type")]
    pub job_type: Option<JobType>,
    /// Resource the job works on.
    #[serde(rename = "restaurantId", alias = "resourceId")]
    pub resource_id: ResourceId,
    /// Server time of the announcement.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Payload shared by every `…progress` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    /// Job the progress belongs to.
    pub job_id: JobId,
    /// Resource the job works on.
    #[serde(default, rename = "restaurantId", alias = "resourceId")]
    pub resource_id: Option<ResourceId>,
    /// Server-assigned monotonic ordinal.
    #[serde(default)]
    pub sequence: Option<u64>,
    /// Units done in this phase.
    #[serde(default)]
    pub current: u64,
    /// Units expected in this phase.
    #[serde(default)]
    pub total: u64,
    /// 0..=100, derived when absent.
    #[serde(default)]
    pub percentage: Option<f64>,
    /// Extra phase markers.
    #[serde(default, deserialize_with = "metadata::deserialize_lenient")]
    pub metadata: Metadata,
    /// Server time of the event.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ProgressPayload {
    /// Percentage as an integer, clamped to 0..=100.
    pub fn percentage(&self) -> Option<u32> {
        self.percentage
            .filter(|p| p.is_finite())
            .map(|p| p.round().clamp(0.0, 100.0) as u32)
    }
}

/// `…:completed` / `…:cancelled` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalPayload {
    /// Finished job.
    pub job_id: JobId,
    /// Server time of the event.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// `…:error` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorPayload {
    /// Failed job.
    pub job_id: JobId,
    /// Error description.
    #[serde(default, alias = "message")]
    pub error: Option<String>,
    /// Server time of the event.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// `queue:current_state` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueSnapshot {
    /// Number of entries reported by the server.
    #[serde(default)]
    pub total: u64,
    /// Every entry the server currently tracks.
    #[serde(default)]
    pub queue: Vec<QueueItem>,
    /// Aggregate counters.
    #[serde(default)]
    pub stats: QueueStats,
    /// Server time of the snapshot.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Payload of the incremental `queue:job_*` events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEventPayload {
    /// Entry the event is about.
    pub queue_id: QueueId,
    /// Materialized job, if any.
    #[serde(default)]
    pub job_id: Option<JobId>,
    /// Kind of work.
    #[serde(default, rename = "type")]
    pub job_type: Option<JobType>,
    /// Resource the entry works on.
    #[serde(default, rename = "restaurantId", alias = "resourceId")]
    pub resource_id: Option<ResourceId>,
    /// Scalar markers.
    #[serde(default, deserialize_with = "metadata::deserialize_lenient")]
    pub metadata: Metadata,
    /// Position while waiting.
    #[serde(default)]
    pub position: Option<u32>,
    /// Error description for failures.
    #[serde(default, alias = "message")]
    pub error: Option<String>,
    /// Server time of the event.
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl QueueEventPayload {
    /// Materialize an entry when the payload carries enough to describe one.
    pub fn to_item(&self, status: QueueStatus) -> Option<QueueItem> {
        let job_type = self.job_type?;
        let resource_id = self.resource_id?;
        Some(QueueItem {
            queue_id: self.queue_id.clone(),
            job_id: self.job_id.clone(),
            job_type,
            resource_id,
            metadata: self.metadata.clone(),
            queue_status: status,
            queued_at: self.timestamp,
            started_at: (status == QueueStatus::Processing)
                .then_some(self.timestamp)
                .flatten(),
            completed_at: None,
            error: self.error.clone(),
            position: (status == QueueStatus::Waiting)
                .then_some(self.position)
                .flatten(),
        })
    }
}

/// Decoded named events sent by the server.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Authoritative job state.
    JobsCurrentState(JobsSnapshot),
    /// The jobs snapshot request failed.
    JobsError(ProtocolErrorPayload),
    /// A job was created on the server.
    JobNew(JobAnnouncement),
    /// Progress of one phase.
    Progress {
        /// Job type implied by the event family.
        family: JobType,
        /// Ordering phase.
        phase: ProgressPhase,
        /// Counters.
        payload: ProgressPayload,
    },
    /// Explicit successful completion.
    Completed {
        /// Job type implied by the event family.
        family: JobType,
        /// Payload.
        payload: TerminalPayload,
    },
    /// Explicit failure.
    Failed {
        /// Job type implied by the event family.
        family: JobType,
        /// Payload.
        payload: JobErrorPayload,
    },
    /// Explicit cancellation.
    Cancelled {
        /// Job type implied by the event family.
        family: JobType,
        /// Payload.
        payload: TerminalPayload,
    },
    /// Authoritative queue state.
    QueueCurrentState(QueueSnapshot),
    /// An entry was queued.
    QueueJobAdded(QueueEventPayload),
    /// An entry started processing.
    QueueJobStarted(QueueEventPayload),
    /// An entry finished.
    QueueJobCompleted(QueueEventPayload),
    /// An entry failed.
    QueueJobFailed(QueueEventPayload),
    /// An entry was cancelled.
    QueueJobCancelled(QueueEventPayload),
}

impl ServerEvent {
    /// Decode a named frame.
    ///
    /// Returns `Ok(None)` for event names this client does not handle, and a
    /// protocol error when a known event carries a malformed payload.
    pub fn decode(frame: EventFrame) -> AppResult<Option<Self>> {
        use JobType::{ResourceCrawl, ReviewCrawl, ReviewSummary};
        use ProgressPhase::{Crawl, Db, Image, Menu, Summary};

        let EventFrame { name, data } = frame;
        let event = match name.as_str() {
            "jobs:current_state" => Self::JobsCurrentState(payload(&name, data)?),
            "jobs:error" => Self::JobsError(payload(&name, data)?),
            "job:new" => Self::JobNew(payload(&name, data)?),
            "review:crawl_progress" => progress(&name, data, ReviewCrawl, Crawl)?,
            "review:db_progress" => progress(&name, data, ReviewCrawl, Db)?,
            "review:image_progress" => progress(&name, data, ReviewCrawl, Image)?,
            "review:completed" => Self::Completed {
                family: ReviewCrawl,
                payload: payload(&name, data)?,
            },
            "review:error" => Self::Failed {
                family: ReviewCrawl,
                payload: payload(&name, data)?,
            },
            "review:cancelled" => Self::Cancelled {
                family: ReviewCrawl,
                payload: payload(&name, data)?,
            },
            "review_summary:progress" => progress(&name, data, ReviewSummary, Summary)?,
            "review_summary:completed" => Self::Completed {
                family: ReviewSummary,
                payload: payload(&name, data)?,
            },
            "review_summary:error" => Self::Failed {
                family: ReviewSummary,
                payload: payload(&name, data)?,
            },
            "review_summary:cancelled" => Self::Cancelled {
                family: ReviewSummary,
                payload: payload(&name, data)?,
            },
            "restaurant:menu_progress" => progress(&name, data, ResourceCrawl, Menu)?,
            "queue:current_state" => Self::QueueCurrentState(payload(&name, data)?),
            "queue:job_added" => Self::QueueJobAdded(payload(&name, data)?),
            "queue:job_started" => Self::QueueJobStarted(payload(&name, data)?),
            "queue:job_completed" => Self::QueueJobCompleted(payload(&name, data)?),
            "queue:job_failed" => Self::QueueJobFailed(payload(&name, data)?),
            "queue:job_cancelled" => Self::QueueJobCancelled(payload(&name, data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Job the event is about, for per-job events.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::JobNew(p) => Some(&p.job_id),
            Self::Progress { payload, .. } => Some(&payload.job_id),
            Self::Completed { payload, .. } | Self::Cancelled { payload, .. } => {
                Some(&payload.job_id)
            }
            Self::Failed { payload, .. } => Some(&payload.job_id),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobsCurrentState(_) => "jobs_current_state",
            Self::JobsError(_) => "jobs_error",
            Self::JobNew(_) => "job_new",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
            Self::QueueCurrentState(_) => "queue_current_state",
            Self::QueueJobAdded(_) => "queue_job_added",
            Self::QueueJobStarted(_) => "queue_job_started",
            Self::QueueJobCompleted(_) => "queue_job_completed",
            Self::QueueJobFailed(_) => "queue_job_failed",
            Self::QueueJobCancelled(_) => "queue_job_cancelled",
        }
    }
}

fn payload<T: DeserializeOwned>(name: &str, data: Value) -> AppResult<T> {
    serde_json::from_value(data)
        .map_err(|e| AppError::protocol(format!("Malformed '{name}' payload: {e}")))
}

fn progress(
    name: &str,
    data: Value,
    family: JobType,
    phase: ProgressPhase,
) -> AppResult<ServerEvent> {
    Ok(ServerEvent::Progress {
        family,
        phase,
        payload: payload(name, data)?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode(name: &str, data: Value) -> Option<ServerEvent> {
        ServerEvent::decode(EventFrame::new(name, data)).expect("decode")
    }

    #[test]
    fn test_progress_family_and_phase() {
        let event = decode(
            "review:db_progress",
            json!({"jobId": "j1", "restaurantId": 4, "current": 3, "total": 10, "percentage": 30}),
        );
        match event {
            Some(ServerEvent::Progress {
                family,
                phase,
                payload,
            }) => {
                assert_eq!(family, JobType::ReviewCrawl);
                assert_eq!(phase, ProgressPhase::Db);
                assert_eq!(payload.resource_id, Some(4));
                assert_eq!(payload.sequence, None);
                assert_eq!(payload.percentage(), Some(30));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_menu_progress_is_resource_crawl() {
        let event = decode(
            "restaurant:menu_progress",
            json!({"jobId": "m1", "current": 1, "total": 2, "metadata": {"step": "menu"}}),
        );
        assert!(matches!(
            event,
            Some(ServerEvent::Progress {
                family: JobType::ResourceCrawl,
                phase: ProgressPhase::Menu,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_event_is_skipped() {
        assert!(decode("restaurant:updated", json!({})).is_none());
    }

    #[test]
    fn test_malformed_known_event_is_protocol_error() {
        let err = ServerEvent::decode(EventFrame::new("review:error", json!({"nope": 1})))
            .unwrap_err();
        assert_eq!(err.kind, pickr_core::error::ErrorKind::Protocol);
    }

    #[test]
    fn test_jobs_error_describe() {
        let Some(ServerEvent::JobsError(p)) =
            decode("jobs:error", json!({"message": "load failed", "error": "db locked"}))
        else {
            panic!("expected jobs:error");
        };
        assert_eq!(p.describe(), "load failed: db locked");
    }

    #[test]
    fn test_queue_payload_to_item() {
        let Some(ServerEvent::QueueJobAdded(p)) = decode(
            "queue:job_added",
            json!({"queueId": "q1", "type": "review_crawl", "restaurantId": 9, "position": 4}),
        ) else {
            panic!("expected queue:job_added");
        };
        let item = p.to_item(QueueStatus::Waiting).expect("item");
        assert_eq!(item.position, Some(4));

        let bare: QueueEventPayload = serde_json::from_value(json!({"queueId": "q2"})).unwrap();
        assert!(bare.to_item(QueueStatus::Waiting).is_none());
    }

    #[test]
    fn test_client_event_frames() {
        assert_eq!(
            ClientEvent::SubscribeRestaurant(42).to_frame(),
            EventFrame::new("subscribe:restaurant", json!(42))
        );
        assert_eq!(
            ClientEvent::SubscribeAllJobs.to_frame().data,
            Value::Null
        );
    }
}
