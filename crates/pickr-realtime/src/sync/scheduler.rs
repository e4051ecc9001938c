//! Deadline table for deferred state transitions.
//!
//! Holds at most one deadline per [`TimerKey`]. The engine loop sleeps until
//! [`CompletionScheduler::next_deadline`] and then drains the due keys, so
//! a cancelled timer can never fire after the fact.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use pickr_core::events::SnapshotKind;
use pickr_core::types::{JobId, QueueId};

/// What a deadline is for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKey {
    /// Promote a job that reached 100% to `completed`.
    Completion(JobId),
    /// Drop a terminal job from the store.
    Evict(JobId),
    /// Drop a failed queue entry from the store.
    QueuePrune(QueueId),
    /// Give up waiting for a snapshot answer.
    SnapshotTimeout(SnapshotKind),
}

impl TimerKey {
    /// Job the key belongs to, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Completion(id) | Self::Evict(id) => Some(id),
            _ => None,
        }
    }
}

/// Cancellable, re-armable deadlines.
#[derive(Debug, Default)]
pub struct CompletionScheduler {
    deadlines: HashMap<TimerKey, Instant>,
}

impl CompletionScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `key` at `at`, replacing any pending deadline for the same key.
    ///
    /// Returns whether a pending deadline was replaced.
    pub fn schedule(&mut self, key: TimerKey, at: Instant) -> bool {
        tracing::trace!(key = ?key, "Timer armed");
        self.deadlines.insert(key, at).is_some()
    }

    /// Arms `key` to fire `after` from `now`.
    pub fn schedule_after(&mut self, key: TimerKey, now: Instant, after: Duration) -> bool {
        self.schedule(key, now + after)
    }

    /// Disarms `key`. Returns whether it was pending.
    pub fn cancel(&mut self, key: &TimerKey) -> bool {
        self.deadlines.remove(key).is_some()
    }

    /// Disarms every timer of one job.
    pub fn cancel_job(&mut self, job_id: &JobId) -> usize {
        let before = self.deadlines.len();
        self.deadlines.retain(|key, _| key.job_id() != Some(job_id));
        before - self.deadlines.len()
    }

    /// Keeps only the timers for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&TimerKey) -> bool) {
        self.deadlines.retain(|key, _| keep(key));
    }

    /// Whether `key` is armed.
    pub fn is_pending(&self, key: &TimerKey) -> bool {
        self.deadlines.contains_key(key)
    }

    /// Deadline of `key`, if armed.
    pub fn deadline(&self, key: &TimerKey) -> Option<Instant> {
        self.deadlines.get(key).copied()
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Removes and returns every key due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerKey> {
        let mut due: Vec<(Instant, TimerKey)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, at)| (*at, key.clone()))
            .collect();
        due.sort();
        for (_, key) in &due {
            self.deadlines.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }

    /// Disarms everything. Returns how many timers were pending.
    pub fn clear(&mut self) -> usize {
        let pending = self.deadlines.len();
        self.deadlines.clear();
        pending
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Whether nothing is armed.
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(id: &str) -> TimerKey {
        TimerKey::Completion(JobId::from(id))
    }

    #[test]
    fn test_rearm_replaces() {
        let mut scheduler = CompletionScheduler::new();
        let t0 = Instant::now();

        assert!(!scheduler.schedule_after(completion("a"), t0, Duration::from_secs(3)));
        assert!(scheduler.schedule_after(completion("a"), t0, Duration::from_secs(5)));

        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.take_due(t0 + Duration::from_secs(3)).is_empty());
        assert_eq!(
            scheduler.take_due(t0 + Duration::from_secs(5)),
            vec![completion("a")]
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut scheduler = CompletionScheduler::new();
        let t0 = Instant::now();
        scheduler.schedule_after(completion("a"), t0, Duration::from_secs(3));

        assert!(scheduler.cancel(&completion("a")));
        assert!(!scheduler.cancel(&completion("a")));
        assert!(scheduler.take_due(t0 + Duration::from_secs(10)).is_empty());
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_take_due_in_deadline_order() {
        let mut scheduler = CompletionScheduler::new();
        let t0 = Instant::now();
        scheduler.schedule_after(completion("late"), t0, Duration::from_millis(300));
        scheduler.schedule_after(
            TimerKey::QueuePrune(QueueId::from("q")),
            t0,
            Duration::from_millis(100),
        );
        scheduler.schedule_after(
            TimerKey::SnapshotTimeout(SnapshotKind::Jobs),
            t0,
            Duration::from_secs(10),
        );

        assert_eq!(
            scheduler.next_deadline(),
            Some(t0 + Duration::from_millis(100))
        );
        let due = scheduler.take_due(t0 + Duration::from_millis(300));
        assert_eq!(
            due,
            vec![TimerKey::QueuePrune(QueueId::from("q")), completion("late")]
        );
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_cancel_job_and_clear() {
        let mut scheduler = CompletionScheduler::new();
        let t0 = Instant::now();
        scheduler.schedule(completion("a"), t0);
        scheduler.schedule(TimerKey::Evict(JobId::from("a")), t0);
        scheduler.schedule(completion("b"), t0);

        assert_eq!(scheduler.cancel_job(&JobId::from("a")), 2);
        assert_eq!(scheduler.clear(), 1);
    }
}
