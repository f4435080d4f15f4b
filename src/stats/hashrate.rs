// src/stats/hashrate.rs
//! Rolling hashrate aggregation
//!
//! Every tick records each worker's cumulative hash count and the time of
//! its last batch, then advances the tracker clock. Rates over a window come
//! from the newest sample and the last sample taken before the window
//! opened, measured up to the clock, so a worker that stops hashing decays
//! towards zero instead of keeping its last speed.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Samples kept per worker
pub const HISTORY_CAPACITY: usize = 4096;

/// Short reporting window
pub const SHORT_WINDOW: Duration = Duration::from_millis(2500);
/// Medium reporting window
pub const MEDIUM_WINDOW: Duration = Duration::from_secs(60);
/// Long reporting window
pub const LARGE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Ring buffer of `(timestamp_ms, cumulative_count)` for one worker
#[derive(Debug, Clone, Default)]
struct HashrateRecord {
    samples: VecDeque<(u64, u64)>,
}

impl HashrateRecord {
    fn push(&mut self, timestamp: u64, count: u64) {
        // An idle worker reports the same sample every tick.
        if self.samples.back() == Some(&(timestamp, count)) {
            return;
        }
        if self.samples.len() == HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back((timestamp, count));
    }

    /// Hashes per second over the `window` ending at `now`
    ///
    /// `None` while the history does not reach back a full window.
    fn rate(&self, window: Duration, now: u64) -> Option<f64> {
        let window = window.as_millis() as u64;
        let &(latest_ts, latest_count) = self.samples.back()?;
        let now = now.max(latest_ts);

        let (earliest_ts, earliest_count) = self
            .samples
            .iter()
            .rev()
            .copied()
            .find(|&(ts, _)| now.saturating_sub(ts) >= window.max(1))?;

        let elapsed = now - earliest_ts;
        if elapsed == 0 {
            return None;
        }

        let hashes = latest_count.saturating_sub(earliest_count);
        Some(hashes as f64 * 1000.0 / elapsed as f64)
    }
}

/// Per-worker sample history and combined rates
#[derive(Debug, Clone)]
pub struct HashrateTracker {
    records: Vec<HashrateRecord>,
    highest: Option<f64>,
    /// Milliseconds since the pool epoch at the last tick
    now: u64,
}

impl HashrateTracker {
    /// Creates a tracker for `workers` workers
    pub fn new(workers: usize) -> Self {
        HashrateTracker {
            records: vec![HashrateRecord::default(); workers],
            highest: None,
            now: 0,
        }
    }

    /// Number of tracked workers
    pub fn workers(&self) -> usize {
        self.records.len()
    }

    /// Records a sample; zero timestamps (worker never ran) are ignored
    pub fn add(&mut self, worker: usize, count: u64, timestamp: u64) {
        if timestamp == 0 {
            return;
        }
        if let Some(record) = self.records.get_mut(worker) {
            record.push(timestamp, count);
        }
    }

    /// Moves the clock rates are measured to; it never goes backwards
    ///
    /// Until the first call, rates end at each worker's newest sample.
    pub fn advance(&mut self, now: u64) {
        self.now = self.now.max(now);
    }

    /// Hashes per second of `worker` over `window`, `None` when unknown
    pub fn rate(&self, worker: usize, window: Duration) -> Option<f64> {
        self.records.get(worker)?.rate(window, self.now)
    }

    /// Sum of the known per-worker rates, `None` when none is known
    pub fn total_rate(&self, window: Duration) -> Option<f64> {
        self.records
            .iter()
            .filter_map(|r| r.rate(window, self.now))
            .fold(None, |acc, rate| Some(acc.unwrap_or(0.0) + rate))
    }

    /// Retains the peak short-window total rate
    pub fn update_highest(&mut self) {
        if let Some(rate) = self.total_rate(SHORT_WINDOW) {
            self.highest = Some(self.highest.map_or(rate, |h| h.max(rate)));
        }
    }

    /// Peak rate seen by [`update_highest`](Self::update_highest)
    pub fn highest(&self) -> Option<f64> {
        self.highest
    }

    /// Immutable copy of every rate, for readers on other threads
    pub fn snapshot(&self) -> HashrateSnapshot {
        HashrateSnapshot {
            workers: (0..self.records.len())
                .map(|i| RateSet::from_fn(|w| self.rate(i, w)))
                .collect(),
            total: RateSet::from_fn(|w| self.total_rate(w)),
            highest: self.highest,
        }
    }

    /// Logs total current and peak rates
    pub fn print(&self) {
        self.snapshot().print();
    }

    /// Logs the rates of one worker
    pub fn print_worker(&self, worker: usize) {
        self.snapshot().print_worker(worker);
    }
}

/// Rates over the short, medium and large windows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateSet {
    /// Last 2.5 seconds
    pub short: Option<f64>,
    /// Last minute
    pub medium: Option<f64>,
    /// Last 15 minutes
    pub large: Option<f64>,
}

impl RateSet {
    fn from_fn(f: impl Fn(Duration) -> Option<f64>) -> Self {
        RateSet {
            short: f(SHORT_WINDOW),
            medium: f(MEDIUM_WINDOW),
            large: f(LARGE_WINDOW),
        }
    }
}

impl fmt::Display for RateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            Rate(self.short),
            Rate(self.medium),
            Rate(self.large)
        )
    }
}

/// Formats an optional rate, `n/a` when unknown
struct Rate(Option<f64>);

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(rate) => write!(f, "{:.1}", rate),
            None => f.write_str("n/a"),
        }
    }
}

/// Published view of the tracker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HashrateSnapshot {
    /// Rates per worker, by index
    pub workers: Vec<RateSet>,
    /// Combined rates
    pub total: RateSet,
    /// Peak combined short-window rate
    pub highest: Option<f64>,
}

impl HashrateSnapshot {
    /// Logs total current and peak rates
    pub fn print(&self) {
        log::info!(
            "speed 2.5s/60s/15m {} H/s max: {} H/s",
            self.total,
            Rate(self.highest)
        );
    }

    /// Logs the rates of one worker
    pub fn print_worker(&self, worker: usize) {
        match self.workers.get(worker) {
            Some(rates) => log::info!("GPU #{} speed 2.5s/60s/15m {} H/s", worker, rates),
            None => log::warn!("No hashrate for unknown GPU #{}", worker),
        }
    }
}
