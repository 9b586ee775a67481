//! Token-scoped fan-out of job progress updates
//!
//! Each job sequence keeps a snapshot, a set of valid capability tokens,
//! and the channels of its current observers. Updates are applied to the
//! snapshot and sent while the relay lock is held, so observers of one
//! sequence see updates in broadcast order. Nothing is replayed: a late
//! joiner starts from the snapshot.
//!
//! A finished sequence is dropped once its last observer leaves; after
//! that it no longer accepts joins.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use ulid::Ulid;

use super::{JobProgressDelta, JobSequenceProgress};
use crate::error::{GradeError, Result};
use crate::bail_invalid;

#[derive(Debug, Default)]
struct RelayState {
    sequences: HashMap<String, SequenceChannel>,
    next_observer_id: u64,
}

#[derive(Debug)]
struct SequenceChannel {
    snapshot: JobSequenceProgress,
    tokens: HashSet<String>,
    observers: Vec<(u64, Sender<JobProgressDelta>)>,
}

/// Shared relay; clones refer to the same state
#[derive(Debug, Clone, Default)]
pub struct JobProgressRelay {
    state: Arc<Mutex<RelayState>>,
}

/// Answer to a join request
#[derive(Debug)]
pub enum JoinResponse {
    Joined {
        snapshot: JobSequenceProgress,
        subscription: Subscription,
    },
    /// Unknown sequence or a token that is not valid for it
    Invalid,
}

impl JoinResponse {
    pub fn is_valid(&self) -> bool {
        matches!(self, JoinResponse::Joined { .. })
    }
}

/// A joined observer; leaves the relay when dropped
#[derive(Debug)]
pub struct Subscription {
    job_sequence_id: String,
    observer_id: u64,
    receiver: Receiver<JobProgressDelta>,
    relay: Weak<Mutex<RelayState>>,
}

fn new_token() -> String {
    hex::encode(&Sha256::digest(Ulid::new().to_string().as_bytes())[..])
}

fn lock(state: &Mutex<RelayState>) -> MutexGuard<'_, RelayState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobProgressRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start relaying a sequence with every item queued.
    ///
    /// Returns the first capability token for it.
    pub fn register_sequence<I, S>(&self, job_sequence_id: &str, item_ids: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = lock(&self.state);
        if state.sequences.contains_key(job_sequence_id) {
            bail_invalid!(
                "job sequence",
                format!("{job_sequence_id} is already registered"),
            );
        }

        let token = new_token();
        let snapshot = JobSequenceProgress::queued(job_sequence_id, item_ids);
        debug!(job_sequence_id, num_total = snapshot.num_total, "registered job sequence");

        state.sequences.insert(
            job_sequence_id.to_string(),
            SequenceChannel {
                snapshot,
                tokens: HashSet::from([token.clone()]),
                observers: Vec::new(),
            },
        );
        Ok(token)
    }

    /// Issue an additional token for a registered sequence
    pub fn issue_token(&self, job_sequence_id: &str) -> Result<String> {
        let mut state = lock(&self.state);
        let channel = state
            .sequences
            .get_mut(job_sequence_id)
            .ok_or_else(|| GradeError::not_found("job sequence", job_sequence_id))?;

        let token = new_token();
        channel.tokens.insert(token.clone());
        Ok(token)
    }

    /// Stop accepting `token` for new joins; existing observers stay
    pub fn revoke_token(&self, job_sequence_id: &str, token: &str) -> bool {
        lock(&self.state)
            .sequences
            .get_mut(job_sequence_id)
            .is_some_and(|channel| channel.tokens.remove(token))
    }

    pub fn join(&self, job_sequence_id: &str, token: &str) -> JoinResponse {
        let mut state = lock(&self.state);
        let observer_id = state.next_observer_id;

        let Some(channel) = state.sequences.get_mut(job_sequence_id) else {
            debug!(job_sequence_id, "join for unknown job sequence");
            return JoinResponse::Invalid;
        };
        if !channel.tokens.contains(token) {
            debug!(job_sequence_id, "join with invalid token");
            return JoinResponse::Invalid;
        }

        let (sender, receiver) = mpsc::channel();
        channel.observers.push((observer_id, sender));
        let snapshot = channel.snapshot.clone();
        state.next_observer_id += 1;

        trace!(job_sequence_id, observer_id, "observer joined");
        JoinResponse::Joined {
            snapshot,
            subscription: Subscription {
                job_sequence_id: job_sequence_id.to_string(),
                observer_id,
                receiver,
                relay: Arc::downgrade(&self.state),
            },
        }
    }

    /// Apply `delta` to the sequence snapshot and broadcast it.
    ///
    /// Returns the number of observers it was delivered to. Observers whose
    /// receiving end is gone are dropped.
    pub fn update(&self, delta: JobProgressDelta) -> Result<usize> {
        let mut state = lock(&self.state);
        let channel = state
            .sequences
            .get_mut(&delta.job_sequence_id)
            .ok_or_else(|| GradeError::not_found("job sequence", &delta.job_sequence_id))?;

        channel.snapshot.apply(&delta);
        channel
            .observers
            .retain(|(_, sender)| sender.send(delta.clone()).is_ok());

        trace!(
            job_sequence_id = %delta.job_sequence_id,
            observers = channel.observers.len(),
            "broadcast job progress"
        );
        Ok(channel.observers.len())
    }

    pub fn snapshot(&self, job_sequence_id: &str) -> Option<JobSequenceProgress> {
        lock(&self.state)
            .sequences
            .get(job_sequence_id)
            .map(|channel| channel.snapshot.clone())
    }

    pub fn observer_count(&self, job_sequence_id: &str) -> usize {
        lock(&self.state)
            .sequences
            .get(job_sequence_id)
            .map_or(0, |channel| channel.observers.len())
    }

    /// Remove an observer; unknown ids are ignored
    pub fn leave(&self, job_sequence_id: &str, observer_id: u64) {
        remove_observer(&self.state, job_sequence_id, observer_id);
    }

    /// Stop relaying a sequence.
    ///
    /// Its tokens become invalid and current observers see their channel
    /// close. Returns false for an unknown sequence.
    pub fn unregister(&self, job_sequence_id: &str) -> bool {
        let removed = lock(&self.state).sequences.remove(job_sequence_id);
        if let Some(channel) = &removed {
            debug!(
                job_sequence_id,
                observers = channel.observers.len(),
                "unregistered job sequence"
            );
        }
        removed.is_some()
    }

    pub fn is_registered(&self, job_sequence_id: &str) -> bool {
        lock(&self.state).sequences.contains_key(job_sequence_id)
    }
}

fn remove_observer(state: &Mutex<RelayState>, job_sequence_id: &str, observer_id: u64) {
    let mut state = lock(state);
    let Some(channel) = state.sequences.get_mut(job_sequence_id) else {
        return;
    };
    channel.observers.retain(|(id, _)| *id != observer_id);
    trace!(job_sequence_id, observer_id, "observer left");

    if channel.observers.is_empty() && channel.snapshot.is_finished() {
        state.sequences.remove(job_sequence_id);
        debug!(job_sequence_id, "released finished job sequence");
    }
}

impl Subscription {
    pub fn job_sequence_id(&self) -> &str {
        &self.job_sequence_id
    }

    pub fn observer_id(&self) -> u64 {
        self.observer_id
    }

    /// Next pending update without blocking
    pub fn try_next(&self) -> Option<JobProgressDelta> {
        self.receiver.try_recv().ok()
    }

    /// All pending updates in broadcast order
    pub fn drain(&self) -> Vec<JobProgressDelta> {
        self.receiver.try_iter().collect()
    }

    /// Wait up to `timeout` for the next update
    pub fn next_timeout(&self, timeout: Duration) -> Option<JobProgressDelta> {
        match self.receiver.recv_timeout(timeout) {
            Ok(delta) => Some(delta),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.relay.upgrade() {
            remove_observer(&state, &self.job_sequence_id, self.observer_id);
        }
    }
}
