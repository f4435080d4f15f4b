// src/miner/scheduler.rs
//! Worker pool scheduler
//!
//! The [`Scheduler`] owns everything: the shared job state, one thread per
//! device, the result queue, the verification stage and the hashrate
//! tracker. Callers publish jobs and toggle mining through it; results come
//! back through the [`Listener`] given to [`Scheduler::start`].
//!
//! Threads:
//! - `gpu-worker-N`: one per device, see [`DeviceWorker`]
//! - `workers-ctl`: drains results on wake, samples hashrate on tick
//! - `verify-N`: the verification pool

use crate::config::Config;
use crate::miner::device::DeviceProvider;
use crate::miner::queue::ResultQueue;
use crate::miner::state::SharedJobState;
use crate::miner::verifier::{Listener, ResultVerifier, Verifier};
use crate::miner::worker::{DeviceWorker, WorkerContext, WorkerStats};
use crate::stats::{HashrateSnapshot, HashrateTracker, LogReporter, RateSet, ReportSink};
use crate::types::{Candidate, Job};
use crate::utils::error::MinerError;
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, after, never, select, tick};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Ticks between peak rate updates
const HIGHEST_EVERY: u64 = 16;

/// Extra delay before the first report, so it covers a full window
const FIRST_REPORT_DELAY: Duration = Duration::from_secs(4);

/// Whether jobs have arrived and whether mining is wanted
#[derive(Debug, Clone, Copy)]
struct Flags {
    active: bool,
    enabled: bool,
}

/// Threads owned until [`Scheduler::stop`]
#[derive(Default)]
struct Threads {
    shutdown: Option<Sender<()>>,
    controller: Option<JoinHandle<()>>,
    workers: Vec<(usize, JoinHandle<Result<(), MinerError>>)>,
}

/// Coordinates jobs, device workers and result delivery
///
/// All methods take `&self`; share it behind an `Arc` with whatever layer
/// feeds jobs in.
pub struct Scheduler {
    config: Config,
    state: Arc<SharedJobState>,
    queue: Arc<ResultQueue>,
    verifier: Arc<ResultVerifier>,
    stats: Vec<Arc<WorkerStats>>,
    hashrate: Arc<ArcSwap<HashrateSnapshot>>,
    epoch: Instant,
    flags: Mutex<Flags>,
    threads: Mutex<Threads>,
    stopped: AtomicBool,
}

impl Scheduler {
    /// Initializes every device and starts the pool, reporting to the log
    ///
    /// # Arguments
    /// * `config` - Devices and timings
    /// * `provider` - Creates one device per `config.devices` entry
    /// * `verifier` - Re-hashes candidates
    /// * `listener` - Receives verified results
    ///
    /// # Errors
    /// Fails without spawning any thread if the configuration is invalid or
    /// any device fails to initialize.
    pub fn start(
        config: Config,
        provider: &dyn DeviceProvider,
        verifier: Arc<dyn Verifier>,
        listener: Arc<dyn Listener>,
    ) -> Result<Self, MinerError> {
        let reporter = Box::new(LogReporter::new(false));
        Self::start_with_reporter(config, provider, verifier, listener, reporter)
    }

    /// Same as [`start`](Self::start) with a custom report sink
    pub fn start_with_reporter(
        config: Config,
        provider: &dyn DeviceProvider,
        verifier: Arc<dyn Verifier>,
        listener: Arc<dyn Listener>,
        reporter: Box<dyn ReportSink>,
    ) -> Result<Self, MinerError> {
        config.validate()?;

        let devices = config
            .devices
            .iter()
            .map(|device| provider.init(device))
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| log::error!("{}", e))?;

        let total = devices.len();
        let state = Arc::new(SharedJobState::new());
        let queue = Arc::new(ResultQueue::new());
        let verifier = Arc::new(ResultVerifier::new(config.verify_threads, verifier, listener)?);
        let epoch = Instant::now();
        let ctx = WorkerContext {
            state: Arc::clone(&state),
            queue: Arc::clone(&queue),
            epoch,
            total,
            idle_poll: config.idle_poll(),
            max_faults: config.max_device_faults.max(1),
        };

        let workers: Vec<DeviceWorker> = devices
            .into_iter()
            .zip(&config.devices)
            .enumerate()
            .map(|(id, (device, dc))| DeviceWorker::new(id, dc.intensity, device, ctx.clone()))
            .collect();

        let empty = HashrateSnapshot {
            workers: vec![RateSet::default(); total],
            ..HashrateSnapshot::default()
        };

        let scheduler = Scheduler {
            stats: workers.iter().map(DeviceWorker::stats).collect(),
            config,
            state,
            queue,
            verifier,
            hashrate: Arc::new(ArcSwap::from_pointee(empty)),
            epoch,
            flags: Mutex::new(Flags {
                active: false,
                enabled: true,
            }),
            threads: Mutex::new(Threads::default()),
            stopped: AtomicBool::new(false),
        };

        for worker in workers {
            scheduler.spawn_worker(worker)?;
        }
        scheduler.spawn_controller(reporter)?;

        log::info!(
            "Started {} device worker(s), {} verification thread(s)",
            total,
            scheduler.config.verify_threads
        );
        Ok(scheduler)
    }

    fn spawn_worker(&self, worker: DeviceWorker) -> Result<(), MinerError> {
        let id = worker.id();
        let spawned = std::thread::Builder::new()
            .name(format!("gpu-worker-{}", id))
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                self.threads.lock().workers.push((id, handle));
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(MinerError::ThreadError(format!(
                    "GPU #{} thread failed to start: {}",
                    id, e
                )))
            }
        }
    }

    fn spawn_controller(&self, reporter: Box<dyn ReportSink>) -> Result<(), MinerError> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        let controller = Controller {
            queue: Arc::clone(&self.queue),
            verifier: Arc::clone(&self.verifier),
            stats: self.stats.clone(),
            tracker: HashrateTracker::new(self.stats.len()),
            published: Arc::clone(&self.hashrate),
            epoch: self.epoch,
            reporter,
            ticks: 0,
            faulted: vec![false; self.stats.len()],
        };
        let tick_interval = self.config.tick_interval();
        let report_interval = self.config.report_interval();

        let spawned = std::thread::Builder::new()
            .name("workers-ctl".into())
            .spawn(move || controller.run(shutdown_rx, tick_interval, report_interval));

        match spawned {
            Ok(handle) => {
                let mut threads = self.threads.lock();
                threads.shutdown = Some(shutdown_tx);
                threads.controller = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(MinerError::ThreadError(format!(
                    "Controller thread failed to start: {}",
                    e
                )))
            }
        }
    }

    /// Publishes a new job to every worker
    ///
    /// While mining is disabled the job is stored and adopted on re-enable.
    pub fn set_job(&self, job: Job) {
        let job = Arc::new(job);
        let mut flags = self.flags.lock();
        flags.active = true;

        if flags.enabled {
            self.state.set_job(job);
        } else {
            self.state.store_job(job);
        }
    }

    /// Pauses or resumes every worker
    ///
    /// No-op when unchanged. Before the first job only the wish is recorded.
    pub fn set_enabled(&self, enabled: bool) {
        let mut flags = self.flags.lock();
        if flags.enabled == enabled {
            return;
        }

        flags.enabled = enabled;
        if !flags.active {
            return;
        }

        self.state.set_paused(!enabled);
    }

    /// Queues a candidate for verification as if a worker had found it
    pub fn submit(&self, candidate: Candidate) {
        self.queue.push(candidate);
    }

    /// Current job
    pub fn job(&self) -> Option<Arc<Job>> {
        self.state.job()
    }

    /// Current sequence number, 0 once stopped
    pub fn sequence(&self) -> u64 {
        self.state.sequence()
    }

    /// Whether a job has been set
    pub fn is_active(&self) -> bool {
        self.flags.lock().active
    }

    /// Whether mining is enabled
    pub fn is_enabled(&self) -> bool {
        self.flags.lock().enabled
    }

    /// Number of device workers
    pub fn workers(&self) -> usize {
        self.stats.len()
    }

    /// Cumulative hashes of one worker
    pub fn hash_count(&self, worker: usize) -> Option<u64> {
        self.stats.get(worker).map(|s| s.hash_count())
    }

    /// Workers dropped after repeated device failures
    pub fn faulted_workers(&self) -> Vec<usize> {
        (0..self.stats.len())
            .filter(|&i| self.stats[i].is_faulted())
            .collect()
    }

    /// Invalid results attributed to `device`
    pub fn verifier_errors(&self, device: usize) -> u64 {
        self.verifier.errors(device)
    }

    /// Results delivered to the listener
    pub fn accepted(&self) -> u64 {
        self.verifier.accepted()
    }

    /// Latest published hashrate snapshot
    pub fn hashrate(&self) -> Arc<HashrateSnapshot> {
        self.hashrate.load_full()
    }

    /// Logs the latest hashrate, per worker first when `detail`
    pub fn print_hashrate(&self, detail: bool) {
        let snapshot = self.hashrate();
        if detail {
            for worker in 0..snapshot.workers.len() {
                snapshot.print_worker(worker);
            }
        }
        snapshot.print();
    }

    /// Stops timers, halts and joins every worker, flushes pending results
    ///
    /// Idempotent; also called on drop.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let threads = std::mem::take(&mut *self.threads.lock());

        drop(threads.shutdown);
        if let Some(controller) = threads.controller {
            if controller.join().is_err() {
                log::error!("Controller thread panicked");
            }
        }

        self.state.stop();
        for (id, handle) in threads.workers {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("{}", e),
                Err(_) => log::error!("GPU #{} thread panicked", id),
            }
        }

        let pending = self.queue.drain_all();
        if !pending.is_empty() {
            log::debug!("Flushing {} pending result(s)", pending.len());
            self.verifier.dispatch(pending);
        }
        if !self.verifier.wait_idle(self.config.shutdown_timeout()) {
            log::warn!(
                "Verification still running after {:?}, abandoning",
                self.config.shutdown_timeout()
            );
        }

        log::info!("Worker pool stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State of the `workers-ctl` thread
struct Controller {
    queue: Arc<ResultQueue>,
    verifier: Arc<ResultVerifier>,
    stats: Vec<Arc<WorkerStats>>,
    tracker: HashrateTracker,
    published: Arc<ArcSwap<HashrateSnapshot>>,
    epoch: Instant,
    reporter: Box<dyn ReportSink>,
    ticks: u64,
    faulted: Vec<bool>,
}

impl Controller {
    fn run(mut self, shutdown: Receiver<()>, tick_interval: Duration, report: Option<Duration>) {
        let ticker = tick(tick_interval);
        let mut first_report = report
            .map(|period| after(period + FIRST_REPORT_DELAY))
            .unwrap_or_else(never);
        let mut reports = never();
        let wake = self.queue.wake_signal().clone();

        loop {
            let mut reported = false;
            select! {
                recv(wake) -> _ => self.on_result(),
                recv(ticker) -> _ => self.on_tick(),
                recv(first_report) -> _ => reported = true,
                recv(reports) -> _ => self.on_report(),
                recv(shutdown) -> _ => break,
            }

            // Periodic reports start after the delayed first one.
            if reported {
                self.on_report();
                first_report = never();
                reports = report.map(tick).unwrap_or_else(never);
            }
        }
    }

    /// Moves everything queued to the verification pool
    fn on_result(&mut self) {
        let batch = self.queue.drain_all();
        if !batch.is_empty() {
            self.verifier.dispatch(batch);
        }
    }

    /// Samples every worker and publishes a snapshot
    fn on_tick(&mut self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        for (id, stats) in self.stats.iter().enumerate() {
            self.tracker.add(id, stats.hash_count(), stats.timestamp());

            if stats.is_faulted() && !self.faulted[id] {
                self.faulted[id] = true;
                log::error!("GPU #{} stopped hashing after repeated failures", id);
            }
        }

        self.tracker.advance(now);

        if self.ticks % HIGHEST_EVERY == 0 {
            self.tracker.update_highest();
        }
        self.ticks += 1;

        let snapshot = Arc::new(self.tracker.snapshot());
        self.published.store(Arc::clone(&snapshot));
        self.reporter.on_tick(&snapshot);
    }

    fn on_report(&mut self) {
        let snapshot = self.published.load_full();
        self.reporter.on_report(&snapshot);
    }
}
