//! Job state store: job id to job, mutated only by the engine loop.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use pickr_core::types::metadata::{self, MetadataValue};
use pickr_core::types::{Job, JobId, JobProgress, JobStatus, JobType, ResourceId};

use crate::message::types::{JobAnnouncement, ProgressPayload, ProgressPhase};

/// Result of applying a progress event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressOutcome {
    /// The job is terminal; nothing changed.
    Ignored,
    /// The job was created or updated.
    Applied {
        /// The job after the update.
        job: Job,
        /// Whether the event created the job.
        created: bool,
    },
}

/// In-memory jobs keyed by id.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: HashMap<JobId, Job>,
}

impl JobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole store with a snapshot. Nothing is merged.
    pub fn replace_all(&mut self, jobs: Vec<Job>) -> usize {
        self.jobs = jobs
            .into_iter()
            .map(|job| {
                let job = job.normalized();
                (job.job_id.clone(), job)
            })
            .collect();
        self.jobs.len()
    }

    /// Get a job by id.
    pub fn get(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    /// Whether the job is known.
    pub fn contains(&self, job_id: &JobId) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// Whether the job is known and terminal.
    pub fn is_terminal(&self, job_id: &JobId) -> bool {
        self.jobs.get(job_id).is_some_and(Job::is_terminal)
    }

    /// All jobs ordered by creation time, then id.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        jobs
    }

    /// Ids of the jobs that are still active.
    pub fn active_ids(&self) -> Vec<JobId> {
        self.jobs
            .values()
            .filter(|job| job.status == JobStatus::Active)
            .map(|job| job.job_id.clone())
            .collect()
    }

    /// Ids of the jobs that are terminal.
    pub fn terminal_ids(&self) -> Vec<JobId> {
        self.jobs
            .values()
            .filter(|job| job.is_terminal())
            .map(|job| job.job_id.clone())
            .collect()
    }

    /// Distinct resources referenced by stored jobs.
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self.jobs.values().map(|job| job.resource_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Applies one progress event.
    ///
    /// Unseen jobs are synthesized as active. Progress is replaced wholesale,
    /// metadata is merged shallowly and tagged with the phase, and an accepted
    /// event clears the interrupted flag.
    pub fn apply_progress(
        &mut self,
        family: JobType,
        phase: ProgressPhase,
        payload: &ProgressPayload,
    ) -> ProgressOutcome {
        let mut created = false;
        let job = self
            .jobs
            .entry(payload.job_id.clone())
            .or_insert_with(|| {
                created = true;
                Job::active(
                    payload.job_id.clone(),
                    payload.resource_id.unwrap_or_default(),
                    family,
                    payload.timestamp,
                )
            });

        if job.is_terminal() {
            return ProgressOutcome::Ignored;
        }

        if let Some(resource_id) = payload.resource_id {
            job.resource_id = resource_id;
        }
        if job.started_at.is_none() {
            job.started_at = payload.timestamp;
        }
        job.progress = JobProgress::new(payload.current, payload.total, payload.percentage());
        metadata::merge(&mut job.metadata, payload.metadata.clone());
        job.metadata
            .insert("phase".to_string(), MetadataValue::from(phase.as_str()));
        job.set_interrupted(false);

        ProgressOutcome::Applied {
            job: job.clone(),
            created,
        }
    }

    /// Records a `job:new` announcement. Returns the job if it was created.
    pub fn announce(&mut self, announcement: &JobAnnouncement) -> Option<Job> {
        if self.jobs.contains_key(&announcement.job_id) {
            return None;
        }
        let job_type = announcement.job_type?;
        let job = Job::active(
            announcement.job_id.clone(),
            announcement.resource_id,
            job_type,
            announcement.timestamp,
        );
        self.jobs.insert(job.job_id.clone(), job.clone());
        Some(job)
    }

    /// Moves a job to a terminal status.
    ///
    /// Returns the updated job, or `None` when the job is unknown or already
    /// terminal (the first terminal transition wins).
    pub fn mark_terminal(
        &mut self,
        job_id: &JobId,
        status: JobStatus,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Option<Job> {
        let job = self.jobs.get_mut(job_id)?;
        job.finish(status, error, at).then(|| job.clone())
    }

    /// Removes a job.
    pub fn evict(&mut self, job_id: &JobId) -> Option<Job> {
        self.jobs.remove(job_id)
    }

    /// Number of stored jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn progress(value: serde_json::Value) -> ProgressPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_unseen_job_is_synthesized() {
        let mut store = JobStore::new();
        let outcome = store.apply_progress(
            JobType::ReviewCrawl,
            ProgressPhase::Crawl,
            &progress(json!({"jobId": "j1", "restaurantId": 5, "current": 2, "total": 10})),
        );

        let ProgressOutcome::Applied { job, created } = outcome else {
            panic!("expected applied");
        };
        assert!(created);
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.resource_id, 5);
        assert_eq!(job.progress.percentage, 20);
        assert_eq!(job.metadata["phase"].as_str(), Some("crawl"));
    }

    #[test]
    fn test_metadata_merges_across_phases() {
        let mut store = JobStore::new();
        store.apply_progress(
            JobType::ReviewCrawl,
            ProgressPhase::Crawl,
            &progress(json!({"jobId": "j1", "current": 5, "total": 10, "metadata": {"source": "naver"}})),
        );
        store.apply_progress(
            JobType::ReviewCrawl,
            ProgressPhase::Db,
            &progress(json!({"jobId": "j1", "current": 1, "total": 10})),
        );

        let job = store.get(&JobId::from("j1")).unwrap();
        assert_eq!(job.metadata["phase"].as_str(), Some("db"));
        assert_eq!(job.metadata["source"].as_str(), Some("naver"));
        assert_eq!(job.progress.current, 1);
    }

    #[test]
    fn test_terminal_job_ignores_progress() {
        let mut store = JobStore::new();
        let id = JobId::from("j1");
        store.replace_all(vec![Job::active(id.clone(), 1, JobType::ReviewSummary, None)]);
        assert!(
            store
                .mark_terminal(&id, JobStatus::Cancelled, None, Utc::now())
                .is_some()
        );
        assert!(
            store
                .mark_terminal(&id, JobStatus::Failed, Some("late".into()), Utc::now())
                .is_none()
        );

        let outcome = store.apply_progress(
            JobType::ReviewSummary,
            ProgressPhase::Summary,
            &progress(json!({"jobId": "j1", "current": 3, "total": 3})),
        );
        assert_eq!(outcome, ProgressOutcome::Ignored);
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_progress_clears_interrupted() {
        let mut store = JobStore::new();
        let mut job = Job::active(JobId::from("j1"), 1, JobType::ResourceCrawl, None);
        job.is_interrupted = true;
        store.replace_all(vec![job]);

        store.apply_progress(
            JobType::ResourceCrawl,
            ProgressPhase::Menu,
            &progress(json!({"jobId": "j1", "current": 1, "total": 4})),
        );
        assert!(!store.get(&JobId::from("j1")).unwrap().is_interrupted);
    }

    #[test]
    fn test_replace_all_drops_missing() {
        let mut store = JobStore::new();
        store.replace_all(vec![Job::active(JobId::from("a"), 1, JobType::ReviewCrawl, None)]);
        store.replace_all(vec![Job::active(JobId::from("b"), 2, JobType::ReviewCrawl, None)]);

        assert!(!store.contains(&JobId::from("a")));
        assert!(store.contains(&JobId::from("b")));
        assert_eq!(store.resource_ids(), vec![2]);
    }

    #[test]
    fn test_announce_creates_once() {
        let mut store = JobStore::new();
        let announcement: JobAnnouncement = serde_json::from_value(
            json!({"jobId": "n1", "type": "review_crawl", "restaurantId": 8}),
        )
        .unwrap();

        assert!(store.announce(&announcement).is_some());
        assert!(store.announce(&announcement).is_none());
        assert_eq!(store.len(), 1);
    }
}
