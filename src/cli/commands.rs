// src/cli/commands.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// XMR Workers CLI - device worker pool
#[derive(Parser, Debug)]
#[command(name = "xmr-workers-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Run the pool on the CPU backend against synthetic jobs
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for the benchmark run
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Configuration file; CPU devices are generated when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Duration of the benchmark in seconds
    #[arg(short, long, default_value_t = 30)]
    pub duration: u64,

    /// Number of CPU devices when no config is given
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Nonces per batch when no config is given
    #[arg(short, long, default_value_t = 4096)]
    pub intensity: u32,

    /// Seconds between synthetic job changes
    #[arg(long, default_value_t = 10)]
    pub job_interval: u64,

    /// Difficulty of the synthetic jobs
    #[arg(long, default_value_t = 5000)]
    pub difficulty: u64,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,

    /// Number of device entries
    #[arg(short, long, default_value_t = 1)]
    pub devices: usize,
}
