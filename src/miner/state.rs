// src/miner/state.rs
//! Shared job state and the pause/resume protocol
//!
//! Two-part synchronization: the `RwLock` guards the job payload, the atomic
//! sequence lets every worker detect "something changed" with a single
//! lock-free load per batch. Writers bump the sequence while still holding
//! the write lock, so a [`JobSnapshot`] taken under the read lock always pairs
//! a job with the sequence that published it.

use crate::types::Job;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Sequence value that tells every worker loop to exit
pub const HALT: u64 = 0;

/// Consistent view of the shared state
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    /// Current job, `None` before the first job arrives
    pub job: Option<Arc<Job>>,
    /// Sequence that published this view
    pub sequence: u64,
    /// Pause flag at that sequence
    pub paused: bool,
}

/// The single active job, its version counter and the pause flag
///
/// Read by every worker, written only by the scheduler.
#[derive(Debug)]
pub struct SharedJobState {
    job: RwLock<Option<Arc<Job>>>,
    sequence: AtomicU64,
    paused: AtomicBool,
}

impl SharedJobState {
    /// Creates the state workers are launched against: sequence 1, paused
    pub fn new() -> Self {
        SharedJobState {
            job: RwLock::new(None),
            sequence: AtomicU64::new(1),
            paused: AtomicBool::new(true),
        }
    }

    /// Publishes a new job, bumps the sequence and clears the pause flag
    pub fn set_job(&self, job: Arc<Job>) {
        let mut guard = self.job.write();
        *guard = Some(job);
        if self.sequence.load(Ordering::SeqCst) == HALT {
            return;
        }
        self.paused.store(false, Ordering::SeqCst);
        self.sequence.fetch_add(1, Ordering::SeqCst);
    }

    /// Replaces the job without notifying workers
    ///
    /// Workers pick it up on the next sequence bump.
    pub fn store_job(&self, job: Arc<Job>) {
        *self.job.write() = Some(job);
    }

    /// Current job
    pub fn job(&self) -> Option<Arc<Job>> {
        self.job.read().clone()
    }

    /// Job, sequence and pause flag read together
    pub fn snapshot(&self) -> JobSnapshot {
        let guard = self.job.read();
        JobSnapshot {
            job: guard.clone(),
            sequence: self.sequence.load(Ordering::SeqCst),
            paused: self.paused.load(Ordering::SeqCst),
        }
    }

    /// Sets the pause flag, bumping the sequence on a transition
    ///
    /// Returns `true` when the flag actually changed.
    pub fn set_paused(&self, paused: bool) -> bool {
        let _guard = self.job.write();
        if self.sequence.load(Ordering::SeqCst) == HALT {
            return false;
        }
        if self.paused.swap(paused, Ordering::SeqCst) == paused {
            return false;
        }
        self.sequence.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Halts every worker loop
    pub fn stop(&self) {
        let _guard = self.job.write();
        self.paused.store(false, Ordering::SeqCst);
        self.sequence.store(HALT, Ordering::SeqCst);
    }

    /// Current sequence, lock-free
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Current pause flag, lock-free
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Whether the state moved past `seen`
    #[inline]
    pub fn is_outdated(&self, seen: u64) -> bool {
        self.sequence() != seen
    }
}

impl Default for SharedJobState {
    fn default() -> Self {
        Self::new()
    }
}
