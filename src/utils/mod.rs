// src/utils/mod.rs
//! Utilities module for common functionality
//!
//! This module contains shared utilities used throughout the worker pool,
//! including error handling and logging infrastructure.

/// Error types and handling utilities
///
/// Contains the [`MinerError`] enum which defines all error conditions
/// the worker pool can report.
pub mod error;

/// Logging configuration and utilities
///
/// Provides logging initialization for the binary and benchmarks.
pub mod logging;

// Re-export for easier access
pub use error::MinerError;
pub use logging::init_logging;
