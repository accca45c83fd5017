//! Tracing setup for the `duckrpc` binary.
//!
//! Stdout carries protocol responses, so logs go to stderr or to a file.

use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Level override, takes precedence over `logging.level`
pub const LEVEL_ENV: &str = "DUCKRPC_LOG";

static TRACE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. Safe to call more than once; only the first
/// call has an effect.
pub fn init(config: &LoggingConfig) {
    if !config.enabled {
        return;
    }

    let level = std::env::var(LEVEL_ENV).unwrap_or_else(|_| config.level.clone());
    let json = config.format == "json";

    let Some(writer) = make_writer(config) else {
        return;
    };

    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(writer);

    // A subscriber installed earlier (tests, embedding) wins.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

fn make_writer(config: &LoggingConfig) -> Option<NonBlocking> {
    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("ERROR: Unable to open log file '{}': {e}", path.display());
                    return None;
                }
            };
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    if TRACE_GUARD.set(guard).is_err() {
        // Already initialised
        return None;
    }
    Some(writer)
}
