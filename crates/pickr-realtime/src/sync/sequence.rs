//! Per-job ordering guard.
//!
//! Each job has one ordinal space for server-assigned `sequence` values and
//! one per progress phase for the `current` counter fallback. Two phases
//! restarting their counters therefore never starve each other, while
//! retransmits within one space are still dropped.

use std::collections::HashMap;

use pickr_core::types::JobId;

use crate::message::types::{ProgressPayload, ProgressPhase};

/// Position of an event in its job's ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordinal {
    /// Server-assigned sequence number.
    Explicit(u64),
    /// Progress counter within one phase.
    Progress {
        /// Phase the counter belongs to.
        phase: ProgressPhase,
        /// Counter value.
        current: u64,
    },
}

impl Ordinal {
    /// Extract the ordinal of a progress event, preferring `sequence`.
    pub fn of(payload: &ProgressPayload, phase: ProgressPhase) -> Self {
        match payload.sequence {
            Some(sequence) => Self::Explicit(sequence),
            None => Self::Progress {
                phase,
                current: payload.current,
            },
        }
    }

    fn value(&self) -> u64 {
        match self {
            Self::Explicit(v) => *v,
            Self::Progress { current, .. } => *current,
        }
    }
}

/// Outcome of an ordering check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The event is in order; its ordinal was recorded.
    Accept,
    /// The event is older than one already applied.
    Stale {
        /// Highest ordinal seen in the same space.
        last: u64,
    },
}

#[derive(Debug, Default)]
struct Entry {
    explicit: Option<u64>,
    by_phase: HashMap<ProgressPhase, Option<u64>>,
}

impl Entry {
    fn last_mut(&mut self, ordinal: Ordinal) -> &mut Option<u64> {
        match ordinal {
            Ordinal::Explicit(_) => &mut self.explicit,
            Ordinal::Progress { phase, .. } => self.by_phase.entry(phase).or_default(),
        }
    }
}

/// Sequence table keyed by job.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    entries: HashMap<JobId, Entry>,
}

impl SequenceGuard {
    /// Creates an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `ordinal` against the last one recorded for `job_id`.
    ///
    /// Strictly smaller ordinals are stale. Equal ordinals are accepted so a
    /// duplicate delivery replaces state with identical values.
    pub fn check(&mut self, job_id: &JobId, ordinal: Ordinal) -> Verdict {
        let incoming = ordinal.value();
        let last = self
            .entries
            .entry(job_id.clone())
            .or_default()
            .last_mut(ordinal);
        match *last {
            Some(prev) if incoming < prev => Verdict::Stale { last: prev },
            _ => {
                *last = Some(incoming);
                Verdict::Accept
            }
        }
    }

    /// Last recorded ordinal in the same space as `ordinal`.
    pub fn last(&self, job_id: &JobId, ordinal: Ordinal) -> Option<u64> {
        let entry = self.entries.get(job_id)?;
        match ordinal {
            Ordinal::Explicit(_) => entry.explicit,
            Ordinal::Progress { phase, .. } => entry.by_phase.get(&phase).copied().flatten(),
        }
    }

    /// Forgets a job so a restart begins a fresh ordinal space.
    pub fn reset(&mut self, job_id: &JobId) -> bool {
        self.entries.remove(job_id).is_some()
    }

    /// Keeps only the jobs for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&JobId) -> bool) {
        self.entries.retain(|id, _| keep(id));
    }

    /// Forgets every job.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no job is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
