// src/miner/worker.rs
//! Device worker run loop
//!
//! Each worker owns one [`Device`] and runs on its own OS thread. It never
//! talks to the scheduler directly: it watches the shared sequence counter,
//! adopts, pauses or resumes jobs when it moves, runs bounded batches, and
//! pushes hits into the result queue.

use crate::miner::device::Device;
use crate::miner::queue::ResultQueue;
use crate::miner::state::{HALT, SharedJobState};
use crate::types::{Candidate, Job};
use crate::utils::error::MinerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters a worker publishes for the hashrate tick
#[derive(Debug, Default)]
pub struct WorkerStats {
    hash_count: AtomicU64,
    timestamp: AtomicU64,
    faulted: AtomicBool,
}

impl WorkerStats {
    /// Cumulative nonces processed
    pub fn hash_count(&self) -> u64 {
        self.hash_count.load(Ordering::Relaxed)
    }

    /// Milliseconds since the pool epoch at the last batch, 0 before the first
    pub fn timestamp(&self) -> u64 {
        self.timestamp.load(Ordering::Relaxed)
    }

    /// Whether the device was dropped after repeated batch failures
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Relaxed)
    }

    fn record(&self, hashes: u64, timestamp: u64) {
        self.hash_count.fetch_add(hashes, Ordering::Relaxed);
        self.timestamp.store(timestamp, Ordering::Relaxed);
    }
}

/// Slice of the nonce space owned by one worker for one job
///
/// Worker `i` of `n` owns `[base + S*i/n, base + S*(i+1)/n)`, with `S = 2^32`,
/// or `S = 2^24` inside the pool-reserved top byte for nicehash jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoncePartition {
    /// First nonce
    pub start: u64,
    /// One past the last nonce
    pub end: u64,
}

impl NoncePartition {
    /// Partition of `job` for worker `id` out of `total`
    pub fn for_worker(job: &Job, id: usize, total: usize) -> Self {
        let (base, space) = if job.nicehash {
            ((job.initial_nonce() & 0xff00_0000) as u64, 1u64 << 24)
        } else {
            (0, 1u64 << 32)
        };
        let total = total.max(1) as u64;
        let id = id as u64 % total;

        NoncePartition {
            start: base + space * id / total,
            end: base + space * (id + 1) / total,
        }
    }

    /// Whether `nonce` falls inside the partition
    pub fn contains(&self, nonce: u32) -> bool {
        (self.start..self.end).contains(&(nonce as u64))
    }

    /// Number of nonces in the partition
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the partition is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a worker is inside a job: the job and its next nonce
#[derive(Debug, Clone)]
struct Cursor {
    job: Arc<Job>,
    next: u64,
    end: u64,
}

/// Observable run state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No job yet, paused, or out of nonces
    Idle,
    /// Executing batches
    Running,
    /// Halted, loop exits
    Stopped,
}

/// Everything a worker shares with the pool
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Shared job state written by the scheduler
    pub state: Arc<SharedJobState>,
    /// Queue candidates are pushed to
    pub queue: Arc<ResultQueue>,
    /// Pool start, timestamps are milliseconds since it
    pub epoch: Instant,
    /// Number of workers in the pool
    pub total: usize,
    /// Sleep between state checks while idle
    pub idle_poll: Duration,
    /// Consecutive failed batches tolerated
    pub max_faults: u32,
}

/// One device and its run loop
pub struct DeviceWorker {
    /// Worker index, also the device id on candidates
    id: usize,
    /// Nonces per batch
    intensity: u32,
    /// Exclusively owned device
    device: Box<dyn Device>,
    ctx: WorkerContext,
    stats: Arc<WorkerStats>,
    /// Job being run and its cursor
    current: Option<Cursor>,
    /// Job and cursor saved at the last pause
    paused: Option<Cursor>,
    /// Last sequence acted on
    sequence: u64,
    status: WorkerState,
    faults: u32,
}

impl DeviceWorker {
    /// Creates a worker for `device`
    ///
    /// # Arguments
    /// * `id` - Worker index in `0..ctx.total`
    /// * `intensity` - Nonces per batch
    /// * `device` - Device this worker exclusively owns
    /// * `ctx` - Shared pool state
    pub fn new(id: usize, intensity: u32, device: Box<dyn Device>, ctx: WorkerContext) -> Self {
        DeviceWorker {
            id,
            intensity: intensity.max(1),
            device,
            ctx,
            stats: Arc::new(WorkerStats::default()),
            current: None,
            paused: None,
            sequence: 0,
            status: WorkerState::Idle,
            faults: 0,
        }
    }

    /// Worker index
    pub fn id(&self) -> usize {
        self.id
    }

    /// Counters shared with the hashrate tick
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Current run state
    pub fn state(&self) -> WorkerState {
        self.status
    }

    /// Next nonce of the running job
    pub fn cursor(&self) -> Option<u64> {
        self.current.as_ref().map(|c| c.next)
    }

    /// Id of the running job
    pub fn job_id(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.job.id.as_str())
    }

    /// Job id and nonce saved at the last pause
    pub fn paused_at(&self) -> Option<(&str, u64)> {
        self.paused.as_ref().map(|c| (c.job.id.as_str(), c.next))
    }

    /// Runs until the halt sequence is observed
    ///
    /// # Errors
    /// Returns `MinerError::DeviceError` when the device keeps failing
    pub fn run(mut self) -> Result<(), MinerError> {
        log::info!("GPU #{} thread started", self.id);

        loop {
            match self.step()? {
                WorkerState::Stopped => break,
                WorkerState::Idle => std::thread::sleep(self.ctx.idle_poll),
                WorkerState::Running => std::thread::yield_now(),
            }
        }

        log::info!(
            "GPU #{} thread stopped after {} hashes",
            self.id,
            self.stats.hash_count()
        );
        Ok(())
    }

    /// One loop iteration: react to state changes, then run at most one batch
    pub fn step(&mut self) -> Result<WorkerState, MinerError> {
        let sequence = self.ctx.state.sequence();
        if sequence == HALT {
            self.status = WorkerState::Stopped;
            return Ok(self.status);
        }

        if sequence != self.sequence {
            self.consume_job();
        }

        if self.status == WorkerState::Running {
            self.run_batch()?;
        }

        Ok(self.status)
    }

    /// Adopts, pauses or resumes according to the shared state
    fn consume_job(&mut self) {
        let snapshot = self.ctx.state.snapshot();
        self.sequence = snapshot.sequence;

        if snapshot.sequence == HALT {
            self.status = WorkerState::Stopped;
            return;
        }

        if snapshot.paused {
            if let Some(current) = self.current.take() {
                log::debug!(
                    "GPU #{} paused job {} at nonce {:08x}",
                    self.id,
                    current.job.id,
                    current.next
                );
                self.paused = Some(current);
            }
            self.status = WorkerState::Idle;
            return;
        }

        let Some(job) = snapshot.job else {
            self.status = WorkerState::Idle;
            return;
        };

        if self.current.as_ref().is_some_and(|c| *c.job == *job) {
            self.status = WorkerState::Running;
            return;
        }

        if let Some(saved) = self.paused.take() {
            if saved.job.id == job.id {
                log::debug!(
                    "GPU #{} resumed job {} at nonce {:08x}",
                    self.id,
                    saved.job.id,
                    saved.next
                );
                self.current = Some(saved);
                self.status = WorkerState::Running;
                return;
            }
        }

        let partition = NoncePartition::for_worker(&job, self.id, self.ctx.total);
        log::debug!(
            "GPU #{} new job {} nonces {:08x}..{:09x}",
            self.id,
            job.id,
            partition.start,
            partition.end
        );
        self.current = Some(Cursor {
            job,
            next: partition.start,
            end: partition.end,
        });
        self.status = WorkerState::Running;
    }

    /// Runs one batch of the current job and queues its hits
    fn run_batch(&mut self) -> Result<(), MinerError> {
        let Some(cursor) = self.current.as_ref() else {
            self.status = WorkerState::Idle;
            return Ok(());
        };

        let remaining = cursor.end - cursor.next;
        if remaining == 0 {
            log::warn!(
                "GPU #{} exhausted its nonce range for job {}",
                self.id,
                cursor.job.id
            );
            self.status = WorkerState::Idle;
            return Ok(());
        }

        let job = Arc::clone(&cursor.job);
        let start = cursor.next;
        let count = remaining.min(self.intensity as u64);

        let hashed = match self.device.run_batch(&job, start as u32, count as u32) {
            Ok(nonces) => {
                self.faults = 0;
                for nonce in nonces {
                    if (start..start + count).contains(&(nonce as u64)) {
                        self.ctx
                            .queue
                            .push(Candidate::new(Arc::clone(&job), nonce, self.id));
                    } else {
                        log::warn!(
                            "GPU #{} reported nonce {:08x} outside batch {:08x}+{}",
                            self.id,
                            nonce,
                            start,
                            count
                        );
                    }
                }
                count
            }
            Err(e) => {
                self.faults += 1;
                log::warn!(
                    "GPU #{} batch at {:08x} failed ({}/{}): {}",
                    self.id,
                    start,
                    self.faults,
                    self.ctx.max_faults,
                    e
                );

                if self.faults >= self.ctx.max_faults {
                    self.stats.faulted.store(true, Ordering::Relaxed);
                    self.status = WorkerState::Stopped;
                    return Err(MinerError::DeviceError(format!(
                        "GPU #{} disabled after {} consecutive failures: {}",
                        self.id, self.faults, e
                    )));
                }
                0
            }
        };

        // Failed batches are skipped, not retried, but hash nothing.
        if let Some(cursor) = self.current.as_mut() {
            cursor.next = start + count;
        }
        if hashed > 0 {
            let now = (self.ctx.epoch.elapsed().as_millis() as u64).max(1);
            self.stats.record(hashed, now);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// Records every batch; reports `hit` when it falls inside the batch
    struct ScriptedDevice {
        batches: Arc<Mutex<Vec<(String, u32, u32)>>>,
        hit: Option<u32>,
        fail: bool,
    }

    impl Device for ScriptedDevice {
        fn run_batch(&mut self, job: &Job, start: u32, count: u32) -> Result<Vec<u32>, MinerError> {
            self.batches.lock().push((job.id.clone(), start, count));
            if self.fail {
                return Err(MinerError::DeviceError("kernel fault".into()));
            }
            Ok(self
                .hit
                .filter(|&n| n >= start && (n as u64) < start as u64 + count as u64)
                .into_iter()
                .collect())
        }
    }

    type Batches = Arc<Mutex<Vec<(String, u32, u32)>>>;

    fn context(total: usize) -> WorkerContext {
        WorkerContext {
            state: Arc::new(SharedJobState::new()),
            queue: Arc::new(ResultQueue::new()),
            epoch: Instant::now(),
            total,
            idle_poll: Duration::from_millis(1),
            max_faults: 3,
        }
    }

    fn worker(id: usize, ctx: &WorkerContext, hit: Option<u32>, fail: bool) -> (DeviceWorker, Batches) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let device = ScriptedDevice {
            batches: Arc::clone(&batches),
            hit,
            fail,
        };
        (DeviceWorker::new(id, 16, Box::new(device), ctx.clone()), batches)
    }

    fn job(id: &str) -> Arc<Job> {
        Arc::new(Job::new(id, vec![0u8; 76], u64::MAX))
    }

    #[test]
    fn idle_until_first_job() {
        let ctx = context(1);
        let (mut w, batches) = worker(0, &ctx, None, false);

        assert_eq!(w.step().unwrap(), WorkerState::Idle);
        assert!(batches.lock().is_empty());

        ctx.state.set_job(job("j1"));
        assert_eq!(w.step().unwrap(), WorkerState::Running);
        assert_eq!(batches.lock()[0], ("j1".to_string(), 0, 16));
        assert_eq!(w.cursor(), Some(16));
    }

    #[test]
    fn partitions_split_the_nonce_space() {
        let j = Job::new("p", Vec::new(), u64::MAX);

        assert_eq!(
            NoncePartition::for_worker(&j, 0, 2),
            NoncePartition { start: 0, end: 1 << 31 }
        );
        assert_eq!(
            NoncePartition::for_worker(&j, 1, 2),
            NoncePartition { start: 1 << 31, end: 1 << 32 }
        );

        for total in [1usize, 3, 7, 64] {
            let parts: Vec<_> = (0..total)
                .map(|i| NoncePartition::for_worker(&j, i, total))
                .collect();
            assert_eq!(parts[0].start, 0);
            assert_eq!(parts[total - 1].end, 1 << 32);
            for pair in parts.windows(2) {
                assert_eq!(pair[0].end, pair[1].start, "gap or overlap");
            }
        }
    }

    #[test]
    fn nicehash_partitions_stay_inside_reserved_byte() {
        let mut blob = vec![0u8; 76];
        blob[39..43].copy_from_slice(&0x5a12_3456u32.to_le_bytes());
        let j = Job::new("nh", blob, u64::MAX).with_nicehash(true);

        let first = NoncePartition::for_worker(&j, 0, 4);
        let last = NoncePartition::for_worker(&j, 3, 4);
        assert_eq!(first.start, 0x5a00_0000);
        assert_eq!(last.end, 0x5b00_0000);
        assert_eq!(first.len(), 1 << 22);
    }

    #[test]
    fn concurrent_workers_never_emit_the_same_nonce() {
        let ctx = context(2);
        let (mut w0, b0) = worker(0, &ctx, None, false);
        let (mut w1, b1) = worker(1, &ctx, None, false);
        ctx.state.set_job(job("j1"));

        for _ in 0..64 {
            w0.step().unwrap();
            w1.step().unwrap();
        }

        let covered = |batches: &Batches| -> HashSet<u32> {
            batches
                .lock()
                .iter()
                .flat_map(|&(_, start, count)| start..start + count)
                .collect()
        };
        let (n0, n1) = (covered(&b0), covered(&b1));
        assert_eq!(n0.len(), 64 * 16);
        assert_eq!(n1.len(), 64 * 16);
        assert!(n0.is_disjoint(&n1));
        assert!(n1.iter().all(|&n| n >= 1 << 31));
    }

    #[test]
    fn resumes_from_exact_cursor_after_pause() {
        let ctx = context(2);
        let (mut w, batches) = worker(1, &ctx, None, false);
        ctx.state.set_job(job("j1"));

        for _ in 0..5 {
            w.step().unwrap();
        }
        let saved = w.cursor().unwrap();
        assert_eq!(saved, (1 << 31) + 5 * 16);

        ctx.state.set_paused(true);
        assert_eq!(w.step().unwrap(), WorkerState::Idle);
        assert_eq!(w.paused_at(), Some(("j1", saved)));
        let before = batches.lock().len();
        for _ in 0..3 {
            assert_eq!(w.step().unwrap(), WorkerState::Idle);
        }
        assert_eq!(batches.lock().len(), before, "no batches while paused");

        ctx.state.set_paused(false);
        assert_eq!(w.step().unwrap(), WorkerState::Running);
        let resumed = batches.lock().last().cloned().unwrap();
        assert_eq!(resumed, ("j1".to_string(), saved as u32, 16));
        assert_eq!(w.paused_at(), None);
    }

    #[test]
    fn new_job_after_pause_restarts_partition() {
        let ctx = context(2);
        let (mut w, batches) = worker(0, &ctx, None, false);
        ctx.state.set_job(job("j1"));
        w.step().unwrap();
        w.step().unwrap();

        ctx.state.set_paused(true);
        w.step().unwrap();
        ctx.state.set_job(job("j2"));
        w.step().unwrap();

        assert_eq!(batches.lock().last().cloned().unwrap(), ("j2".to_string(), 0, 16));
        assert_eq!(w.paused_at(), None);

        // The old snapshot is gone: returning to j1 starts over.
        ctx.state.set_job(job("j1"));
        w.step().unwrap();
        assert_eq!(batches.lock().last().cloned().unwrap(), ("j1".to_string(), 0, 16));
    }

    #[test]
    fn identical_job_update_keeps_progress() {
        let ctx = context(1);
        let (mut w, _) = worker(0, &ctx, None, false);
        ctx.state.set_job(job("j1"));
        w.step().unwrap();
        w.step().unwrap();

        ctx.state.set_job(job("j1"));
        w.step().unwrap();
        assert_eq!(w.cursor(), Some(48));
    }

    #[test]
    fn hits_become_candidates_for_the_batch_job() {
        let ctx = context(1);
        let (mut w, _) = worker(0, &ctx, Some(42), false);
        ctx.state.set_job(job("j1"));

        for _ in 0..4 {
            w.step().unwrap();
        }

        let candidates = ctx.queue.drain_all();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].nonce, 42);
        assert_eq!(candidates[0].job.id, "j1");
        assert_eq!(candidates[0].device_id, 0);
        assert_eq!(w.stats().hash_count(), 64);
        assert!(w.stats().timestamp() > 0);
    }

    #[test]
    fn out_of_batch_nonces_are_dropped() {
        let ctx = context(2);
        // Nonce 42 belongs to worker 0; worker 1 must never queue it.
        let (mut w, _) = worker(1, &ctx, Some(42), false);
        ctx.state.set_job(job("j1"));
        w.step().unwrap();

        assert!(ctx.queue.is_empty());
    }

    #[test]
    fn failed_batches_hash_nothing_then_fault() {
        let ctx = context(1);
        let (mut w, batches) = worker(0, &ctx, None, true);
        ctx.state.set_job(job("j1"));

        assert_eq!(w.step().unwrap(), WorkerState::Running);
        assert_eq!(w.step().unwrap(), WorkerState::Running);
        assert_eq!(w.cursor(), Some(32), "failed batches still advance");
        assert_eq!(w.stats().hash_count(), 0, "failed batches hash nothing");
        assert_eq!(w.stats().timestamp(), 0);

        let err = w.step().unwrap_err();
        assert!(matches!(err, MinerError::DeviceError(_)));
        assert!(w.stats().is_faulted());
        assert_eq!(w.state(), WorkerState::Stopped);
        assert_eq!(batches.lock().len(), 3);
        assert!(ctx.queue.is_empty());
    }

    #[test]
    fn exhausted_partition_goes_idle() {
        let ctx = context(1);
        let (mut w, batches) = worker(0, &ctx, None, false);
        ctx.state.set_job(job("j1"));
        w.step().unwrap();

        if let Some(cursor) = w.current.as_mut() {
            cursor.next = cursor.end - 10;
        }
        assert_eq!(w.step().unwrap(), WorkerState::Running);
        assert_eq!(batches.lock().last().unwrap().2, 10);
        assert_eq!(w.step().unwrap(), WorkerState::Idle);
        assert_eq!(batches.lock().len(), 2);
    }

    #[test]
    fn halt_stops_the_thread() {
        let ctx = context(1);
        let (w, _) = worker(0, &ctx, None, false);
        ctx.state.set_job(job("j1"));

        let handle = std::thread::spawn(move || w.run());
        std::thread::sleep(Duration::from_millis(20));
        ctx.state.stop();

        assert!(handle.join().unwrap().is_ok());
    }
}
