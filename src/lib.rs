//! XMR Workers - device worker pool for a Monero-style miner
//!
//! This crate distributes jobs across a fixed set of device worker threads and
//! brings their results back:
//! - A shared job state with a sequence counter, so job changes, pauses and
//!   resumes reach every worker without per-worker coordination
//! - Exact resume of a paused job from the saved nonce cursor
//! - A lossless multi-producer result queue and an off-thread verifier
//! - Rolling per-device hashrate statistics

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Worker pool core: state, workers, result pipeline and scheduler
pub mod miner;

/// Hashrate tracking and reporting
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::{Config, DeviceConfig};
pub use miner::{Device, DeviceProvider, Listener, Scheduler, Verification, Verifier};
pub use stats::{HashrateSnapshot, HashrateTracker, ReportSink};
pub use types::{Candidate, Job, JobResult};
pub use utils::{MinerError, init_logging};
