//! `duckrpc` binary
//!
//! Serves the line-delimited JSON protocol on stdin/stdout until the client
//! sends `x` or closes its end of the pipe.
//!
//! ## Usage
//!
//! ```bash
//! # Default configuration (duckrpc.toml / duckrpc.local.toml / DUCKRPC_*)
//! duckrpc
//!
//! # Explicit config file, verbose logs on stderr
//! duckrpc --config ./duckrpc.toml --log-level debug
//! ```

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use duckrpc::{logging, Config, Session};

#[derive(Parser, Debug)]
#[command(name = "duckrpc")]
#[command(about = "Line-delimited JSON RPC server for DuckDB over stdio")]
#[command(version)]
struct Args {
    /// Configuration file (replaces duckrpc.toml lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive, overrides the config file
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    logging::init(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "duckrpc_starting");

    let mut session = Session::new(&config);
    session
        .run(io::stdin().lock(), io::stdout().lock())
        .context("session aborted")?;

    tracing::info!("duckrpc_exiting");
    Ok(())
}
