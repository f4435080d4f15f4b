//! Configuration management for the worker pool
//!
//! Configuration is TOML: a list of `[[devices]]` plus controller timings.
//! Every field except the device list has a default.

/// Core configuration implementation
///
/// Contains the [`Config`] and [`DeviceConfig`] types.
pub mod config;

// Re-export key items for easy access
pub use config::{Config, DeviceConfig};

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads and validates configuration from a TOML file
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    Config::load(path)
}

/// Generates a commented configuration template with `devices` entries
pub fn generate_template(devices: usize) -> String {
    Config::generate_template(devices)
}
