//! Command-line interface for the `xmr_workers-rs` binary

/// Clap command definitions
pub mod commands;

pub use commands::{Action, BenchmarkOptions, Commands, ConfigOptions};
