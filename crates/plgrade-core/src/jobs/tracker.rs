//! Per-session view of the job sequences being watched

use std::collections::BTreeMap;

use tracing::debug;

use super::relay::{JobProgressRelay, JoinResponse, Subscription};
use super::{merge_statuses, JobItemStatus, JobProgressDelta, JobSequenceProgress};

/// Job sequences one session is tracking.
///
/// Owned by a single session; not shared.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    jobs: BTreeMap<String, JobSequenceProgress>,
    subscriptions: BTreeMap<String, Subscription>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a sequence on `relay` and start tracking its snapshot.
    ///
    /// Returns false for an invalid join; the sequence is then not tracked
    /// and the caller falls back to a static view.
    pub fn record_join(&mut self, relay: &JobProgressRelay, job_sequence_id: &str, token: &str) -> bool {
        match relay.join(job_sequence_id, token) {
            JoinResponse::Joined {
                snapshot,
                subscription,
            } => {
                self.track(snapshot);
                self.subscriptions
                    .insert(job_sequence_id.to_string(), subscription);
                true
            }
            JoinResponse::Invalid => false,
        }
    }

    /// Track a snapshot received by other means; replaces any existing one
    pub fn track(&mut self, snapshot: JobSequenceProgress) {
        self.jobs
            .insert(snapshot.job_sequence_id.clone(), snapshot);
    }

    /// Apply an update; updates for untracked sequences are ignored
    pub fn apply_update(&mut self, delta: &JobProgressDelta) -> bool {
        match self.jobs.get_mut(&delta.job_sequence_id) {
            Some(job) => {
                job.apply(delta);
                true
            }
            None => false,
        }
    }

    /// Apply every pending relay update. Returns how many were applied.
    pub fn poll(&mut self) -> usize {
        let pending: Vec<JobProgressDelta> = self
            .subscriptions
            .values()
            .flat_map(Subscription::drain)
            .collect();

        pending
            .iter()
            .filter(|delta| self.apply_update(delta))
            .count()
    }

    /// Stop tracking a finished sequence.
    ///
    /// Returns false and keeps the sequence while it is still running.
    pub fn dismiss(&mut self, job_sequence_id: &str) -> bool {
        match self.jobs.get(job_sequence_id) {
            Some(job) if job.is_finished() => {
                self.jobs.remove(job_sequence_id);
                self.subscriptions.remove(job_sequence_id);
                debug!(job_sequence_id, "dismissed job sequence");
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, job_sequence_id: &str) -> Option<&JobSequenceProgress> {
        self.jobs.get(job_sequence_id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobSequenceProgress> {
        self.jobs.values()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Minimum-wins status per item across all tracked sequences
    pub fn effective_statuses(&self) -> BTreeMap<String, JobItemStatus> {
        merge_statuses(self.jobs.values())
    }
}
