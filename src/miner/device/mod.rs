//! Device capability
//!
//! The worker pool never executes kernels itself. A [`DeviceProvider`] turns
//! each configured device into a [`Device`] that runs bounded batches and
//! reports which nonces look promising.
//!
//! Currently implements:
//! - A reference CPU backend ([`cpu`]) used by the benchmark command and tests

/// Reference CPU backend
///
/// Hashes blobs with double SHA-256 through the `sha2` crate. Slow, but it
/// produces real, verifiable candidates without any GPU runtime.
pub mod cpu;

use crate::config::DeviceConfig;
use crate::types::Job;
use crate::utils::error::MinerError;

/// A single compute device, exclusively owned by one worker thread
pub trait Device: Send {
    /// Run `count` nonces starting at `start` against `job`
    ///
    /// # Returns
    /// Nonces in `start..start + count` whose hash looks like it meets the
    /// job target. They are re-checked by the verifier before delivery.
    fn run_batch(&mut self, job: &Job, start: u32, count: u32) -> Result<Vec<u32>, MinerError>;
}

/// Initializes devices from their configuration
///
/// Any error aborts [`Scheduler::start`](crate::Scheduler::start) before a
/// single worker thread is spawned.
pub trait DeviceProvider {
    /// Initialize one device
    fn init(&self, config: &DeviceConfig) -> Result<Box<dyn Device>, MinerError>;
}
