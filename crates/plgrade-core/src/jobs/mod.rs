//! Batch grading job progress
//!
//! A job sequence is one batch run (e.g. AI grading of many instance
//! questions) with a status per item. [`ProgressTracker`] holds the
//! sequences one session is watching, and [`JobProgressRelay`] fans status
//! updates out to every session that joined with a valid token.

pub mod relay;
pub mod tracker;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use relay::{JobProgressRelay, JoinResponse, Subscription};
pub use tracker::ProgressTracker;

/// Status of one item in a job sequence.
///
/// The declaration order is the merge order: `Queued < InProgress < Failed
/// < Complete`. A failure sorts before completion so a late success from
/// another job cannot mask it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobItemStatus {
    #[default]
    Queued,
    InProgress,
    Failed,
    Complete,
}

impl JobItemStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobItemStatus::Failed | JobItemStatus::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobItemStatus::Queued => "queued",
            JobItemStatus::InProgress => "in_progress",
            JobItemStatus::Failed => "failed",
            JobItemStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for JobItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full status snapshot of one job sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSequenceProgress {
    pub job_sequence_id: String,
    pub item_statuses: BTreeMap<String, JobItemStatus>,
    pub num_complete: u64,
    pub num_total: u64,
}

/// Incremental update emitted by the batch grading executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgressDelta {
    pub job_sequence_id: String,
    #[serde(default)]
    pub item_statuses: BTreeMap<String, JobItemStatus>,
    /// Derived from the item statuses when absent
    #[serde(default)]
    pub num_complete: Option<u64>,
    #[serde(default)]
    pub num_total: Option<u64>,
}

impl JobSequenceProgress {
    /// A new sequence with every item queued
    pub fn queued<I, S>(job_sequence_id: impl Into<String>, item_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let item_statuses: BTreeMap<String, JobItemStatus> = item_ids
            .into_iter()
            .map(|id| (id.into(), JobItemStatus::Queued))
            .collect();
        let num_total = item_statuses.len() as u64;

        Self {
            job_sequence_id: job_sequence_id.into(),
            item_statuses,
            num_complete: 0,
            num_total,
        }
    }

    /// All items have finished, successfully or not
    pub fn is_finished(&self) -> bool {
        self.num_complete >= self.num_total
    }

    /// Fold an update into this snapshot
    pub fn apply(&mut self, delta: &JobProgressDelta) {
        self.item_statuses
            .extend(delta.item_statuses.iter().map(|(k, v)| (k.clone(), *v)));

        self.num_complete = delta.num_complete.unwrap_or_else(|| {
            self.item_statuses
                .values()
                .filter(|status| status.is_finished())
                .count() as u64
        });
        if let Some(total) = delta.num_total {
            self.num_total = total;
        } else {
            self.num_total = self.num_total.max(self.item_statuses.len() as u64);
        }
    }
}

impl JobProgressDelta {
    pub fn new(job_sequence_id: impl Into<String>) -> Self {
        Self {
            job_sequence_id: job_sequence_id.into(),
            item_statuses: BTreeMap::new(),
            num_complete: None,
            num_total: None,
        }
    }

    pub fn with_item(mut self, item_id: impl Into<String>, status: JobItemStatus) -> Self {
        self.item_statuses.insert(item_id.into(), status);
        self
    }

    pub fn with_counts(mut self, num_complete: u64, num_total: u64) -> Self {
        self.num_complete = Some(num_complete);
        self.num_total = Some(num_total);
        self
    }
}

/// Effective status per item across all jobs that report it.
///
/// The minimum status wins, so a stale duplicate job still reporting an
/// item as queued keeps it from showing as done.
pub fn merge_statuses<'a, I>(jobs: I) -> BTreeMap<String, JobItemStatus>
where
    I: IntoIterator<Item = &'a JobSequenceProgress>,
{
    let mut merged: BTreeMap<String, JobItemStatus> = BTreeMap::new();
    for job in jobs {
        for (item_id, status) in &job.item_statuses {
            merged
                .entry(item_id.clone())
                .and_modify(|current| *current = (*current).min(*status))
                .or_insert(*status);
        }
    }
    merged
}
