// src/miner/queue.rs
//! Result handoff between worker threads and the scheduler
//!
//! Many producers push under a short-held mutex; the scheduler drains the
//! whole queue whenever the wake signal fires. The wake channel has capacity
//! one, so any number of pushes before the consumer wakes collapse into a
//! single drain cycle.

use crate::types::Candidate;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;

/// Multi-producer, single-consumer candidate queue with a coalescing wake
#[derive(Debug)]
pub struct ResultQueue {
    entries: Mutex<Vec<Candidate>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl ResultQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        ResultQueue {
            entries: Mutex::new(Vec::new()),
            wake_tx,
            wake_rx,
        }
    }

    /// Appends a candidate and wakes the consumer
    pub fn push(&self, candidate: Candidate) {
        self.entries.lock().push(candidate);

        match self.wake_tx.try_send(()) {
            // A wake is already pending; its drain will see this entry.
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::warn!("Result queue wake channel closed");
            }
        }
    }

    /// Removes and returns every queued candidate
    pub fn drain_all(&self) -> Vec<Candidate> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Receiver that fires after pushes; select on it, then [`drain_all`](Self::drain_all)
    pub fn wake_signal(&self) -> &Receiver<()> {
        &self.wake_rx
    }

    /// Number of queued candidates
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultQueue {
    fn default() -> Self {
        Self::new()
    }
}
