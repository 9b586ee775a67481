//! Optimistic concurrency for manual grading
//!
//! A grader submits the version of the instance question they loaded. If
//! the stored version differs, someone else graded in between and the
//! update must be refused.

use chrono::{DateTime, Utc};

/// Decides whether a client's version is stale relative to the stored one
pub trait ConflictChecker {
    type Version;

    fn is_conflict(&self, client: &Self::Version, stored: &Self::Version) -> bool;
}

/// Compares modification timestamps.
///
/// Two writes landing in the same clock tick are indistinguishable. A
/// version counter can replace this behind the same trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModifiedAtChecker;

impl ConflictChecker for ModifiedAtChecker {
    type Version = DateTime<Utc>;

    fn is_conflict(&self, client: &DateTime<Utc>, stored: &DateTime<Utc>) -> bool {
        client != stored
    }
}

/// True iff the client-held timestamp differs from the stored one
pub fn detect_conflict(client: &DateTime<Utc>, stored: &DateTime<Utc>) -> bool {
    ModifiedAtChecker.is_conflict(client, stored)
}
