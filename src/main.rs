// src/main.rs
use clap::Parser;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use xmr_workers_rs::miner::device::cpu::{CpuProvider, CpuVerifier, sha256d};
use xmr_workers_rs::utils::logging::init_bench_logging;
use xmr_workers_rs::{self, *};

/// Length of the synthetic hashing blobs
const BLOB_LEN: usize = 76;

/// How long the benchmark keeps mining paused before resuming
const PAUSE_FOR: Duration = Duration::from_secs(1);

/// Main entry point for the worker pool binary
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Runs the worker pool on the CPU backend against synthetic jobs
///
/// # Operations
/// 1. Loads the configuration or builds one CPU device per thread
/// 2. Starts the scheduler with the CPU verifier and a logging listener
/// 3. Rotates jobs every `job_interval` seconds, pausing and resuming the
///    current job once per round
/// 4. Prints the final hashrate and stops the pool
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let config = match &opts.config {
        Some(path) => config::load(path)?,
        None => Config::with_devices(
            (0..opts.threads.max(1))
                .map(|index| DeviceConfig::new(index, opts.intensity, 8))
                .collect(),
        ),
    };

    let listener: Arc<dyn Listener> = Arc::new(|result: &JobResult| {
        log::info!("accepted {}", result);
    });
    let scheduler = Scheduler::start(
        config,
        &CpuProvider::default(),
        Arc::new(CpuVerifier),
        listener,
    )?;

    log::info!(
        "Starting benchmark on {} workers for {} seconds",
        scheduler.workers(),
        opts.duration
    );

    let target = u64::MAX / opts.difficulty.max(1);
    let interval = Duration::from_secs(opts.job_interval.max(1));
    let deadline = Instant::now() + Duration::from_secs(opts.duration);
    let mut round = 0u64;

    while Instant::now() < deadline {
        scheduler.set_job(synthetic_job(round, target));

        let switch_at = (Instant::now() + interval).min(deadline);
        let pause_at = Instant::now() + interval / 2;
        let mut paused = false;

        while Instant::now() < switch_at {
            if !paused && Instant::now() >= pause_at && pause_at + PAUSE_FOR < switch_at {
                log::debug!("pausing job {:08x}", round);
                scheduler.set_enabled(false);
                thread::sleep(PAUSE_FOR);
                scheduler.set_enabled(true);
                paused = true;
            }
            thread::sleep(Duration::from_millis(100));
        }

        round += 1;
    }

    scheduler.print_hashrate(true);
    for worker in 0..scheduler.workers() {
        log::info!(
            "worker #{}: {} hashes, {} compute errors",
            worker,
            scheduler.hash_count(worker).unwrap_or(0),
            scheduler.verifier_errors(worker)
        );
    }
    log::info!("Benchmark results: {} accepted over {} jobs", scheduler.accepted(), round);

    scheduler.stop();
    log::logger().flush();

    Ok(())
}

/// Generates configuration template file
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    init_logging();

    let template = config::generate_template(opts.devices);
    std::fs::write(&opts.output, template)?;
    log::info!("Configuration template written to {}", opts.output.display());
    Ok(())
}

/// Deterministic job for benchmark round `round`
fn synthetic_job(round: u64, target: u64) -> Job {
    let seed = sha256d(&round.to_le_bytes());
    let blob: Vec<u8> = seed.iter().cycle().take(BLOB_LEN).copied().collect();

    Job::new(hex::encode(&seed[..4]), blob, target)
}
