// src/miner/mod.rs
//! Core worker pool
//!
//! This module contains the pieces the [`Scheduler`] wires together:
//! - Shared job state and the pause/resume protocol
//! - Device workers and the device capability
//! - The result queue and the verification stage

/// Device capability and the reference CPU backend
pub mod device;

/// Result queue between worker threads and the scheduler
pub mod queue;

/// Worker pool scheduler
///
/// Owns the shared state, the worker threads, the result pipeline and the
/// hashrate tracker.
pub mod scheduler;

/// Shared job state: current job, sequence counter and pause flag
pub mod state;

/// Asynchronous candidate verification
pub mod verifier;

/// Device worker run loop
pub mod worker;

// Re-export main components for cleaner imports
pub use self::device::{Device, DeviceProvider};
pub use self::queue::ResultQueue;
pub use self::scheduler::Scheduler;
pub use self::state::{JobSnapshot, SharedJobState};
pub use self::verifier::{Listener, ResultVerifier, Verification, Verifier};
pub use self::worker::{DeviceWorker, NoncePartition, WorkerContext, WorkerState, WorkerStats};
