//! Statistics collection and reporting module
//!
//! - [`HashrateTracker`] keeps per-worker sample histories and computes
//!   rolling rates over 2.5 s, 60 s and 15 min windows
//! - [`ReportSink`] implementations consume the snapshots the scheduler
//!   publishes on every tick

/// Rolling hashrate history and snapshots
pub mod hashrate;

/// Snapshot consumers: log and channel reporters
pub mod reporter;

// Re-export main components
pub use hashrate::{HashrateSnapshot, HashrateTracker, RateSet};
pub use reporter::{ChannelReporter, LogReporter, ReportSink};
