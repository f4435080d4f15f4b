// src/miner/verifier.rs
//! Asynchronous result verification
//!
//! Candidates drained from the [`ResultQueue`](crate::miner::queue::ResultQueue)
//! are re-hashed on a dedicated rayon pool, sized independently of the
//! device count. Valid results go to the [`Listener`] exactly once; invalid
//! ones are counted against the device that produced them and dropped.

use crate::types::{Candidate, Job, JobResult};
use crate::utils::error::MinerError;
use parking_lot::{Condvar, Mutex};
use rayon::iter::Either;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Outcome of re-hashing one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    /// Authoritative hash for (job, nonce)
    pub hash: [u8; 32],
    /// Whether the hash meets the job target
    pub valid: bool,
}

/// Authoritative hash function, stateless from the pool's point of view
pub trait Verifier: Send + Sync {
    /// Recompute the hash of `job` at `nonce` and judge it
    fn verify(&self, job: &Job, nonce: u32) -> Result<Verification, MinerError>;
}

/// Receives verified results, typically a pool submission layer
///
/// Called from verification threads. Failures inside the listener are its
/// own business; results are never re-delivered.
pub trait Listener: Send + Sync {
    /// Handle one verified result
    fn on_result(&self, result: &JobResult);
}

impl<F> Listener for F
where
    F: Fn(&JobResult) + Send + Sync,
{
    fn on_result(&self, result: &JobResult) {
        self(result)
    }
}

struct Shared {
    verifier: Arc<dyn Verifier>,
    listener: Arc<dyn Listener>,
    errors: Mutex<BTreeMap<usize, u64>>,
    accepted: AtomicU64,
    in_flight: Mutex<usize>,
    idle: Condvar,
}

/// Decrements the in-flight gauge even if verification panics
struct InFlight(Arc<Shared>);

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut in_flight = self.0.in_flight.lock();
        *in_flight -= 1;
        if *in_flight == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Verification stage running on its own thread pool
pub struct ResultVerifier {
    pool: rayon::ThreadPool,
    shared: Arc<Shared>,
}

impl ResultVerifier {
    /// Creates the stage with `threads` verification threads
    pub fn new(
        threads: usize,
        verifier: Arc<dyn Verifier>,
        listener: Arc<dyn Listener>,
    ) -> Result<Self, MinerError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("verify-{}", i))
            .panic_handler(|_| log::error!("Verification task panicked"))
            .build()?;

        Ok(ResultVerifier {
            pool,
            shared: Arc::new(Shared {
                verifier,
                listener,
                errors: Mutex::new(BTreeMap::new()),
                accepted: AtomicU64::new(0),
                in_flight: Mutex::new(0),
                idle: Condvar::new(),
            }),
        })
    }

    /// Queues a batch for verification and returns immediately
    pub fn dispatch(&self, batch: Vec<Candidate>) {
        if batch.is_empty() {
            return;
        }

        *self.shared.in_flight.lock() += 1;
        let guard = InFlight(Arc::clone(&self.shared));

        self.pool.spawn(move || {
            let shared = Arc::clone(&guard.0);
            shared.process(batch);
            drop(guard);
        });
    }

    /// Blocks until no batch is in flight or `timeout` passes
    ///
    /// # Returns
    /// `true` when the stage went idle
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut in_flight = self.shared.in_flight.lock();

        while *in_flight > 0 {
            if self
                .shared
                .idle
                .wait_until(&mut in_flight, deadline)
                .timed_out()
            {
                return *in_flight == 0;
            }
        }
        true
    }

    /// Invalid results attributed to `device`
    pub fn errors(&self, device: usize) -> u64 {
        self.shared.errors.lock().get(&device).copied().unwrap_or(0)
    }

    /// Invalid results across all devices
    pub fn total_errors(&self) -> u64 {
        self.shared.errors.lock().values().sum()
    }

    /// Results delivered to the listener
    pub fn accepted(&self) -> u64 {
        self.shared.accepted.load(Ordering::Relaxed)
    }
}

impl Shared {
    fn process(&self, batch: Vec<Candidate>) {
        let (verified, rejected): (Vec<JobResult>, Vec<usize>) = batch
            .into_par_iter()
            .partition_map(|candidate| self.check(candidate));

        verified.into_par_iter().for_each(|result| self.deliver(&result));

        if rejected.is_empty() {
            return;
        }

        let mut per_device = BTreeMap::new();
        for device in rejected {
            *per_device.entry(device).or_insert(0u64) += 1;
        }

        let mut errors = self.errors.lock();
        for (device, count) in per_device {
            *errors.entry(device).or_insert(0) += count;
            log::error!(
                "GPU #{} compute error: {} invalid result(s), {} total",
                device,
                count,
                errors[&device]
            );
        }
    }

    /// Re-hashes one candidate: the result when valid, else its device id
    fn check(&self, candidate: Candidate) -> Either<JobResult, usize> {
        match self.verifier.verify(&candidate.job, candidate.nonce) {
            Ok(Verification { hash, valid: true }) => Either::Left(JobResult {
                job: candidate.job,
                nonce: candidate.nonce,
                hash,
                device_id: candidate.device_id,
            }),
            Ok(_) => Either::Right(candidate.device_id),
            Err(e) => {
                log::warn!(
                    "Verification of nonce {:08x} for job {} failed: {}",
                    candidate.nonce,
                    candidate.job.id,
                    e
                );
                Either::Right(candidate.device_id)
            }
        }
    }

    /// Hands one result to the listener; a panicking listener loses only it
    fn deliver(&self, result: &JobResult) {
        log::debug!("Verified {}", result);

        match panic::catch_unwind(AssertUnwindSafe(|| self.listener.on_result(result))) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                log::error!(
                    "Listener panicked on nonce {:08x} for job {}: {}",
                    result.nonce,
                    result.job_id(),
                    reason
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::collections::HashMap;

    /// Even nonces are valid, nonces above 1000 fail to verify
    struct ParityVerifier;

    impl Verifier for ParityVerifier {
        fn verify(&self, _job: &Job, nonce: u32) -> Result<Verification, MinerError> {
            if nonce > 1000 {
                return Err(MinerError::VerificationError("out of range".into()));
            }
            Ok(Verification {
                hash: [nonce as u8; 32],
                valid: nonce % 2 == 0,
            })
        }
    }

    fn candidates(
        job: &Arc<Job>,
        device: usize,
        nonces: impl IntoIterator<Item = u32>,
    ) -> Vec<Candidate> {
        nonces
            .into_iter()
            .map(|n| Candidate::new(Arc::clone(job), n, device))
            .collect()
    }

    #[test]
    fn delivers_valid_and_counts_invalid_exactly_once() {
        let (tx, rx) = unbounded();
        let listener = move |result: &JobResult| {
            tx.send((result.device_id, result.nonce)).unwrap();
        };
        let stage = ResultVerifier::new(3, Arc::new(ParityVerifier), Arc::new(listener)).unwrap();
        let job = Arc::new(Job::new("mixed", Vec::new(), u64::MAX));

        stage.dispatch(candidates(&job, 0, 0..100));
        stage.dispatch(candidates(&job, 1, 100..150));
        stage.dispatch(candidates(&job, 1, [1001, 1002]));
        assert!(stage.wait_idle(Duration::from_secs(5)));

        let mut delivered: HashMap<(usize, u32), usize> = HashMap::new();
        for key in rx.try_iter() {
            *delivered.entry(key).or_default() += 1;
        }

        assert_eq!(delivered.len(), 50 + 25);
        assert!(delivered.values().all(|&n| n == 1));
        assert!(delivered.keys().all(|(_, nonce)| nonce % 2 == 0));
        assert_eq!(stage.accepted(), 75);
        assert_eq!(stage.errors(0), 50);
        assert_eq!(stage.errors(1), 25 + 2);
        assert_eq!(stage.total_errors(), 77);
        assert_eq!(stage.errors(7), 0);
    }

    #[test]
    fn result_carries_candidate_job_and_hash() {
        let (tx, rx) = unbounded();
        let listener = move |result: &JobResult| {
            tx.send(result.clone()).unwrap();
        };
        let stage = ResultVerifier::new(1, Arc::new(ParityVerifier), Arc::new(listener)).unwrap();
        let old = Arc::new(Job::new("old", Vec::new(), u64::MAX));

        stage.dispatch(candidates(&old, 4, [42]));
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(result.job_id(), "old");
        assert_eq!(result.nonce, 42);
        assert_eq!(result.hash, [42u8; 32]);
        assert_eq!(result.device_id, 4);
    }

    #[test]
    fn empty_batch_is_ignored() {
        let listener = |_: &JobResult| {};
        let stage = ResultVerifier::new(1, Arc::new(ParityVerifier), Arc::new(listener)).unwrap();
        stage.dispatch(Vec::new());

        assert!(stage.wait_idle(Duration::from_millis(10)));
        assert_eq!(stage.accepted(), 0);
    }

    #[test]
    fn panicking_listener_does_not_wedge_the_stage() {
        let listener = |result: &JobResult| {
            if result.nonce == 2 {
                panic!("listener failure");
            }
        };
        let stage = ResultVerifier::new(2, Arc::new(ParityVerifier), Arc::new(listener)).unwrap();
        let job = Arc::new(Job::new("p", Vec::new(), u64::MAX));

        stage.dispatch(candidates(&job, 0, [2]));
        assert!(stage.wait_idle(Duration::from_secs(5)));
        assert_eq!(stage.accepted(), 0);
    }

    #[test]
    fn listener_panic_loses_only_that_result() {
        let (tx, rx) = unbounded();
        let listener = move |result: &JobResult| {
            if result.nonce == 0 {
                panic!("submission failed");
            }
            let _ = tx.send(result.nonce);
        };
        let stage = ResultVerifier::new(4, Arc::new(ParityVerifier), Arc::new(listener)).unwrap();
        let job = Arc::new(Job::new("batch", Vec::new(), u64::MAX));

        // 501 valid (even) nonces in a single batch, the first one panics.
        stage.dispatch(candidates(&job, 0, 0..=1000));
        assert!(stage.wait_idle(Duration::from_secs(5)));

        let mut delivered: Vec<u32> = rx.try_iter().collect();
        delivered.sort_unstable();
        assert_eq!(delivered, (2..=1000).step_by(2).collect::<Vec<u32>>());
        assert_eq!(stage.accepted(), 500);
        assert_eq!(stage.errors(0), 500);
    }
}
