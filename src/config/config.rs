use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the worker pool
///
/// One [`DeviceConfig`] per worker thread, plus the timing and sizing knobs
/// of the controller and the verification pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Devices to drive, one worker thread each
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Threads in the result verification pool
    /// (default: half the CPU cores, at least one)
    #[serde(default = "default_verify_threads")]
    pub verify_threads: usize,

    /// Seconds between hashrate reports, 0 disables them
    #[serde(default = "default_print_time")]
    pub print_time: u64,

    /// Milliseconds between hashrate samples
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Milliseconds an idle worker sleeps between state checks
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Consecutive failed batches before a device is considered faulted
    #[serde(default = "default_max_device_faults")]
    pub max_device_faults: u32,

    /// Upper bound on waiting for in-flight verification at shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// Per-device settings handed to the device provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Platform device index
    pub index: usize,
    /// Nonces per batch
    pub intensity: u32,
    /// Work-group size
    #[serde(default = "default_worksize")]
    pub worksize: u32,
}

impl DeviceConfig {
    /// Creates a device entry
    pub fn new(index: usize, intensity: u32, worksize: u32) -> Self {
        DeviceConfig {
            index,
            intensity,
            worksize,
        }
    }
}

fn default_verify_threads() -> usize {
    (num_cpus::get() / 2).max(1)
}

fn default_print_time() -> u64 {
    60
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_idle_poll_ms() -> u64 {
    50
}

fn default_max_device_faults() -> u32 {
    8
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

fn default_worksize() -> u32 {
    8
}

impl Default for Config {
    fn default() -> Self {
        Config {
            devices: Vec::new(),
            verify_threads: default_verify_threads(),
            print_time: default_print_time(),
            tick_interval_ms: default_tick_interval_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            max_device_faults: default_max_device_faults(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Config {
    /// Creates a configuration for the given devices with default timings
    pub fn with_devices(devices: Vec<DeviceConfig>) -> Self {
        Config {
            devices,
            ..Config::default()
        }
    }

    /// Loads and validates configuration from a TOML file
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values the scheduler relies on
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.devices.is_empty() {
            return Err(MinerError::ConfigError("No devices configured".into()));
        }

        for device in &self.devices {
            if device.intensity == 0 || device.worksize == 0 {
                return Err(MinerError::ConfigError(format!(
                    "Device #{}: intensity and worksize must be non-zero",
                    device.index
                )));
            }
        }

        if self.tick_interval_ms == 0 {
            return Err(MinerError::ConfigError(
                "tick_interval_ms must be non-zero".into(),
            ));
        }
        if self.verify_threads == 0 {
            return Err(MinerError::ConfigError(
                "verify_threads must be non-zero".into(),
            ));
        }

        Ok(())
    }

    /// Hashrate sampling period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Idle worker poll period
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }

    /// Report period, `None` when reports are disabled
    pub fn report_interval(&self) -> Option<Duration> {
        (self.print_time > 0).then(|| Duration::from_secs(self.print_time))
    }

    /// Shutdown wait for verification
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Generates a configuration template string
    ///
    /// # Arguments
    /// * `devices` - Number of `[[devices]]` entries to emit
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template(devices: usize) -> String {
        let mut template = String::new();
        template.push_str("# Worker pool configuration\n\n");
        template.push_str("# Threads verifying candidate results\n");
        template.push_str(&format!("verify_threads = {}\n", default_verify_threads()));
        template.push_str("# Seconds between hashrate reports (0 = off)\n");
        template.push_str("print_time = 60\n");
        template.push_str("# Hashrate sampling period in milliseconds\n");
        template.push_str("tick_interval_ms = 500\n");
        template.push_str("# Idle worker poll period in milliseconds\n");
        template.push_str("idle_poll_ms = 50\n");
        template.push_str("# Consecutive failed batches before a device is dropped\n");
        template.push_str("max_device_faults = 8\n");
        template.push_str("# Wait for in-flight verification on shutdown\n");
        template.push_str("shutdown_timeout_ms = 5000\n");

        for index in 0..devices.max(1) {
            template.push_str("\n[[devices]]\n");
            template.push_str(&format!("index = {}\n", index));
            template.push_str("intensity = 4096\n");
            template.push_str("worksize = 8\n");
        }

        template
    }
}
