// src/utils/logging.rs
//! Logging configuration
//!
//! Both entry points install an `env_logger` writing to stdout. Every line
//! carries the emitting thread name, so output from `gpu-worker-N`,
//! `verify-N` and the controller loop can be told apart.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes logging at Info, or from `RUST_LOG` when it is set
pub fn init_logging() {
    init_with_default(LevelFilter::Info);
}

/// Initializes logging at Debug, or from `RUST_LOG` when it is set
///
/// Used by the benchmark command, where per-device batch logs are useful.
pub fn init_bench_logging() {
    init_with_default(LevelFilter::Debug);
}

fn init_with_default(level: LevelFilter) {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(level);
    } else {
        builder.parse_env("RUST_LOG");
    }

    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}

/// Base builder: `[ts level thread module:line] message` on stdout
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_millis();
            let thread = std::thread::current();
            let name = thread.name().unwrap_or("-");

            writeln!(
                buf,
                "[{} {} {} {}:{}] {}",
                ts,
                record.level(),
                name,
                record.module_path().unwrap_or_default(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
