//! Tracing configuration and log routing.
//!
//! Human-readable logs always go to stderr so that chunk output on stdout stays machine
//! readable. A second, non-blocking file layer is installed when either variable is set:
//!
//! - `RUSTY_RAG_LOG_FILE`: append to that exact file.
//! - `RUSTY_RAG_LOG_DIR`: daily-rotated `rustyrag.log` files in that directory.
//!
//! `RUST_LOG` overrides the verbosity chosen on the command line.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "rustyrag.log";

/// Install the global subscriber. `verbosity` counts `-v` flags on the command line.
pub fn init_tracing(verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    match file_writer() {
        Some(writer) => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false),
            )
            .init(),
        None => registry.init(),
    }
}

/// Filter used when `RUST_LOG` is absent. Dependencies stay at `warn` until `-vvv`.
fn default_directive(verbosity: u8) -> String {
    let (own, others) = match verbosity {
        0 => ("info", "warn"),
        1 => ("debug", "warn"),
        2 => ("trace", "warn"),
        _ => ("trace", "debug"),
    };
    format!("{others},rustyrag={own}")
}

fn file_writer() -> Option<NonBlocking> {
    if let Ok(path) = std::env::var("RUSTY_RAG_LOG_FILE") {
        return append_writer(Path::new(&path));
    }
    let directory = std::env::var("RUSTY_RAG_LOG_DIR").ok()?;
    if let Err(err) = std::fs::create_dir_all(&directory) {
        eprintln!("Failed to create log directory {directory}: {err}");
        return None;
    }
    let appender = tracing_appender::rolling::daily(&directory, LOG_FILE_PREFIX);
    Some(keep_alive(tracing_appender::non_blocking(appender)))
}

fn append_writer(path: &Path) -> Option<NonBlocking> {
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => Some(keep_alive(tracing_appender::non_blocking(file))),
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

fn keep_alive((writer, guard): (NonBlocking, WorkerGuard)) -> NonBlocking {
    let _ = LOG_GUARD.set(guard);
    writer
}
