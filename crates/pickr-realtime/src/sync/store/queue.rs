//! Queue state store: queue entries plus the aggregate counters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use pickr_core::types::{QueueId, QueueItem, QueueStats, QueueStatus};

use crate::message::types::QueueEventPayload;

/// In-memory queue entries keyed by queue id.
#[derive(Debug, Default)]
pub struct QueueStore {
    items: HashMap<QueueId, QueueItem>,
    stats: QueueStats,
}

impl QueueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces entries and counters with a snapshot.
    ///
    /// Only live entries (`waiting`, `processing`, `failed`) are kept.
    /// Returns the ids of the failed entries so they can be pruned later.
    pub fn replace_all(&mut self, items: Vec<QueueItem>, stats: QueueStats) -> Vec<QueueId> {
        self.items = items
            .into_iter()
            .filter(|item| {
                matches!(
                    item.queue_status,
                    QueueStatus::Waiting | QueueStatus::Processing | QueueStatus::Failed
                )
            })
            .map(|item| (item.queue_id.clone(), item))
            .collect();
        self.stats = stats;
        self.ids_with(QueueStatus::Failed)
    }

    /// Get an entry by id.
    pub fn get(&self, queue_id: &QueueId) -> Option<&QueueItem> {
        self.items.get(queue_id)
    }

    /// Aggregate counters.
    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Entries ordered: processing, waiting by position, failed.
    pub fn list(&self) -> Vec<QueueItem> {
        let mut items: Vec<QueueItem> = self.items.values().cloned().collect();
        items.sort_by(|a, b| {
            group(a.queue_status)
                .cmp(&group(b.queue_status))
                .then_with(|| {
                    a.position
                        .unwrap_or(u32::MAX)
                        .cmp(&b.position.unwrap_or(u32::MAX))
                })
                .then_with(|| a.queued_at.cmp(&b.queued_at))
                .then_with(|| a.queue_id.cmp(&b.queue_id))
        });
        items
    }

    /// `queue:job_added`: inserts a waiting entry when the payload describes one.
    pub fn insert_added(&mut self, payload: &QueueEventPayload) -> Option<QueueItem> {
        if self.items.contains_key(&payload.queue_id) {
            return None;
        }
        let item = payload.to_item(QueueStatus::Waiting)?;
        self.items.insert(item.queue_id.clone(), item.clone());
        self.stats.total += 1;
        self.stats.waiting += 1;
        Some(item)
    }

    /// `queue:job_started`: moves an entry `waiting → processing`.
    pub fn start(&mut self, payload: &QueueEventPayload) -> Option<QueueItem> {
        let at = payload.timestamp.or_else(|| Some(Utc::now()));
        let item = match self.items.get_mut(&payload.queue_id) {
            Some(item) => {
                if !item.advance(QueueStatus::Processing, at) {
                    return None;
                }
                if item.job_id.is_none() {
                    item.job_id = payload.job_id.clone();
                }
                item.clone()
            }
            None => {
                let item = payload.to_item(QueueStatus::Processing)?;
                self.items.insert(item.queue_id.clone(), item.clone());
                item
            }
        };
        self.stats.waiting = self.stats.waiting.saturating_sub(1);
        self.stats.processing += 1;
        Some(item)
    }

    /// `queue:job_completed`: removes the entry and counts one less processing.
    pub fn complete(&mut self, queue_id: &QueueId) -> Option<QueueItem> {
        let removed = self.items.remove(queue_id);
        self.decrement(QueueStatus::Processing);
        self.stats.completed += 1;
        self.stats.total = self.stats.total.saturating_sub(1);
        removed
    }

    /// `queue:job_failed`: marks the entry failed. It stays visible until pruned.
    pub fn fail(&mut self, payload: &QueueEventPayload, at: DateTime<Utc>) -> Option<QueueItem> {
        let item = match self.items.get_mut(&payload.queue_id) {
            Some(item) => {
                let prior = item.queue_status;
                if !item.advance(QueueStatus::Failed, Some(at)) {
                    return None;
                }
                item.error = payload.error.clone();
                let item = item.clone();
                self.decrement(prior);
                item
            }
            None => {
                let mut item = payload.to_item(QueueStatus::Failed)?;
                item.completed_at = Some(at);
                self.items.insert(item.queue_id.clone(), item.clone());
                self.decrement(QueueStatus::Processing);
                item
            }
        };
        self.stats.failed += 1;
        Some(item)
    }

    /// `queue:job_cancelled`: removes the entry and counts one less waiting.
    pub fn cancel(&mut self, queue_id: &QueueId) -> Option<QueueItem> {
        let removed = self.items.remove(queue_id);
        self.decrement(QueueStatus::Waiting);
        self.stats.cancelled += 1;
        self.stats.total = self.stats.total.saturating_sub(1);
        removed
    }

    /// Drops a failed entry once its grace window elapsed.
    pub fn prune(&mut self, queue_id: &QueueId) -> Option<QueueItem> {
        match self.items.get(queue_id) {
            Some(item) if item.queue_status == QueueStatus::Failed => {
                self.stats.total = self.stats.total.saturating_sub(1);
                self.items.remove(queue_id)
            }
            _ => None,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn ids_with(&self, status: QueueStatus) -> Vec<QueueId> {
        self.items
            .values()
            .filter(|item| item.queue_status == status)
            .map(|item| item.queue_id.clone())
            .collect()
    }

    fn decrement(&mut self, status: QueueStatus) {
        let counter = match status {
            QueueStatus::Waiting => &mut self.stats.waiting,
            QueueStatus::Processing => &mut self.stats.processing,
            _ => return,
        };
        *counter = counter.saturating_sub(1);
    }
}

fn group(status: QueueStatus) -> u8 {
    match status {
        QueueStatus::Processing => 0,
        QueueStatus::Waiting => 1,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use pickr_core::types::{JobType, Metadata};

    use super::*;

    fn payload(value: serde_json::Value) -> QueueEventPayload {
        serde_json::from_value(value).unwrap()
    }

    fn item(id: &str, status: QueueStatus, position: Option<u32>) -> QueueItem {
        QueueItem {
            queue_id: QueueId::from(id),
            job_id: None,
            job_type: JobType::ReviewCrawl,
            resource_id: 1,
            metadata: Metadata::new(),
            queue_status: status,
            queued_at: None,
            started_at: None,
            completed_at: None,
            error: None,
            position,
        }
    }

    #[test]
    fn test_snapshot_keeps_only_live_entries() {
        let mut store = QueueStore::new();
        let failed = store.replace_all(
            vec![
                item("w", QueueStatus::Waiting, Some(1)),
                item("p", QueueStatus::Processing, None),
                item("f", QueueStatus::Failed, None),
                item("c", QueueStatus::Completed, None),
            ],
            QueueStats::default(),
        );

        assert_eq!(store.len(), 3);
        assert_eq!(failed, vec![QueueId::from("f")]);
    }

    #[test]
    fn test_list_order() {
        let mut store = QueueStore::new();
        store.replace_all(
            vec![
                item("f", QueueStatus::Failed, None),
                item("w2", QueueStatus::Waiting, Some(2)),
                item("p", QueueStatus::Processing, None),
                item("w1", QueueStatus::Waiting, Some(1)),
            ],
            QueueStats::default(),
        );
        let order: Vec<String> = store
            .list()
            .into_iter()
            .map(|i| i.queue_id.into_inner())
            .collect();
        assert_eq!(order, vec!["p", "w1", "w2", "f"]);
    }

    #[test]
    fn test_completed_never_drives_stat_negative() {
        let mut store = QueueStore::new();
        assert_eq!(store.stats().processing, 0);

        store.complete(&QueueId::from("ghost"));
        assert_eq!(store.stats().processing, 0);
        assert_eq!(store.stats().completed, 1);
    }

    #[test]
    fn test_cancelled_floors_waiting() {
        let mut store = QueueStore::new();
        store.cancel(&QueueId::from("ghost"));
        assert_eq!(store.stats().waiting, 0);
    }

    #[test]
    fn test_cancel_decrements_waiting_whatever_the_entry_status() {
        let mut store = QueueStore::new();
        store.replace_all(
            vec![
                item("q1", QueueStatus::Processing, None),
                item("q2", QueueStatus::Waiting, Some(1)),
                item("q3", QueueStatus::Waiting, Some(2)),
            ],
            QueueStats {
                total: 3,
                waiting: 2,
                processing: 1,
                ..QueueStats::default()
            },
        );

        assert!(store.cancel(&QueueId::from("q1")).is_some());
        assert_eq!(store.stats().waiting, 1);
        assert_eq!(store.stats().processing, 1);
        assert_eq!(store.stats().cancelled, 1);
        assert_eq!(store.stats().total, 2);
    }

    #[test]
    fn test_complete_decrements_processing_whatever_the_entry_status() {
        let mut store = QueueStore::new();
        store.replace_all(
            vec![
                item("q1", QueueStatus::Waiting, Some(1)),
                item("q2", QueueStatus::Processing, None),
            ],
            QueueStats {
                total: 2,
                waiting: 1,
                processing: 1,
                ..QueueStats::default()
            },
        );

        assert!(store.complete(&QueueId::from("q1")).is_some());
        assert_eq!(store.stats().waiting, 1);
        assert_eq!(store.stats().processing, 0);
        assert_eq!(store.stats().completed, 1);
    }

    #[test]
    fn test_lifecycle_moves_counters() {
        let mut store = QueueStore::new();
        let added = payload(json!({"queueId": "q1", "type": "review_crawl", "restaurantId": 3, "position": 1}));
        assert!(store.insert_added(&added).is_some());
        assert_eq!(store.stats().waiting, 1);

        let started = payload(json!({"queueId": "q1", "jobId": "j9"}));
        let item = store.start(&started).unwrap();
        assert_eq!(item.queue_status, QueueStatus::Processing);
        assert_eq!(item.job_id, Some("j9".into()));
        assert_eq!(store.stats().waiting, 0);
        assert_eq!(store.stats().processing, 1);
        assert!(store.start(&started).is_none());

        let failed = payload(json!({"queueId": "q1", "error": "blocked"}));
        let item = store.fail(&failed, Utc::now()).unwrap();
        assert_eq!(item.error.as_deref(), Some("blocked"));
        assert_eq!(store.stats().processing, 0);
        assert_eq!(store.stats().failed, 1);

        assert!(store.prune(&QueueId::from("q1")).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_prune_ignores_non_failed() {
        let mut store = QueueStore::new();
        store.replace_all(
            vec![item("w", QueueStatus::Waiting, Some(1))],
            QueueStats::default(),
        );
        assert!(store.prune(&QueueId::from("w")).is_none());
        assert_eq!(store.len(), 1);
    }
}
