// src/utils/error.rs
use std::io;
use thiserror::Error;

/// Main error type for the worker pool
///
/// Only initialization failures escape [`Scheduler::start`](crate::Scheduler::start).
/// Batch and verification errors are absorbed by the layer that sees them,
/// logged and counted.
#[derive(Error, Debug)]
pub enum MinerError {
    /// A configured device could not be initialized
    #[error("Device #{index} initialization failed: {reason}")]
    DeviceInitError {
        /// Device index from the configuration
        index: usize,
        /// Provider supplied reason
        reason: String,
    },

    /// A device batch failed, or a device failed persistently
    #[error("Device error: {0}")]
    DeviceError(String),

    /// The verifier could not recompute a candidate hash
    #[error("Verification error: {0}")]
    VerificationError(String),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Worker, controller or verifier thread errors
    #[error("Thread error: {0}")]
    ThreadError(String),
}

/// Converts TOML parse errors into MinerError
///
/// Used when a configuration file exists but cannot be deserialized.
impl From<toml::de::Error> for MinerError {
    fn from(e: toml::de::Error) -> Self {
        MinerError::ConfigError(format!("Invalid config format: {}", e))
    }
}

/// Converts rayon pool construction errors into MinerError
impl From<rayon::ThreadPoolBuildError> for MinerError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        MinerError::ThreadError(format!("Verification pool failed to start: {}", e))
    }
}
