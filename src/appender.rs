//! Appender Worker
//!
//! A DuckDB appender is bound to one connection and must not be driven from
//! several threads. Each open appender therefore lives on its own thread
//! together with a dedicated connection, and the session talks to it through
//! a rendezvous channel.
//!
//! ## Architecture
//!
//! ```text
//! Session (main thread)                 worker thread "appender:main.t"
//! ─────────────────────                 ───────────────────────────────
//! spawn() ───────── start ────────────► appender_to_db(table, schema)
//!         ◄──────── open result ─────── (loop exits here on failure)
//! append(row) ───── Append{row} ──────► append_row
//!             ◄──── Result ───────────
//! close() ───────── Close ────────────► flush, drop appender, close conn
//!         ◄──────── Result ─────────── (loop exits)
//! ```
//!
//! The command channel has capacity 0, so a send only completes once the
//! worker is ready to take it, and every command carries a one-slot reply
//! channel on which the caller blocks. At most one operation is in flight.
//!
//! An append error is reported for that call only; the worker keeps running
//! and the caller decides whether to close it.

use crossbeam_channel as channel;
use duckdb::types::Value;
use duckdb::{appender_params_from_iter, Connection};

/// Errors crossing the worker boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppenderError {
    #[error("spawn appender worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("open appender: {0}")]
    Open(#[source] duckdb::Error),

    #[error("append: {0}")]
    Append(#[source] duckdb::Error),

    #[error("flush appender: {0}")]
    Flush(#[source] duckdb::Error),

    #[error("close appender: worker panicked")]
    Panicked,

    #[error("appender worker terminated")]
    Terminated,
}

type Reply = channel::Sender<Result<(), AppenderError>>;

enum AppenderCommand {
    Append { row: Vec<Value>, response: Reply },
    Close { response: Reply },
}

/// Handle to a running appender worker.
///
/// Dropping the handle closes the worker: buffered rows are flushed and the
/// dedicated connection is closed before the thread is joined.
#[derive(Debug)]
pub struct AppenderWorker {
    schema: String,
    table: String,
    command_tx: channel::Sender<AppenderCommand>,
    worker_handle: Option<std::thread::JoinHandle<()>>,
}

impl AppenderWorker {
    /// Start a worker owning `conn` and open an appender on `schema.table`.
    ///
    /// Returns only after the worker reports the open result. On failure the
    /// thread has already exited and `conn` is closed.
    pub fn spawn(conn: Connection, schema: &str, table: &str) -> Result<Self, AppenderError> {
        let (command_tx, command_rx) = channel::bounded::<AppenderCommand>(0);
        let (ready_tx, ready_rx) = channel::bounded(1);

        let (schema_owned, table_owned) = (schema.to_string(), table.to_string());
        let worker_handle = std::thread::Builder::new()
            .name(format!("appender:{schema}.{table}"))
            .spawn(move || {
                Self::worker_loop(conn, &schema_owned, &table_owned, &ready_tx, &command_rx);
            })
            .map_err(AppenderError::Spawn)?;

        let opened = ready_rx.recv().map_err(|_| AppenderError::Terminated);
        match opened.and_then(|r| r) {
            Ok(()) => {
                tracing::debug!(schema, table, "appender_opened");
                Ok(Self {
                    schema: schema.to_string(),
                    table: table.to_string(),
                    command_tx,
                    worker_handle: Some(worker_handle),
                })
            }
            Err(e) => {
                if worker_handle.join().is_err() {
                    return Err(AppenderError::Panicked);
                }
                Err(e)
            }
        }
    }

    fn worker_loop(
        conn: Connection,
        schema: &str,
        table: &str,
        ready: &Reply,
        command_rx: &channel::Receiver<AppenderCommand>,
    ) {
        let outcome = {
            let mut appender = match conn.appender_to_db(table, schema) {
                Ok(appender) => appender,
                Err(e) => {
                    // conn is dropped on return, before the caller joins
                    let _ = ready.send(Err(AppenderError::Open(e)));
                    return;
                }
            };
            let _ = ready.send(Ok(()));

            loop {
                match command_rx.recv() {
                    Ok(AppenderCommand::Append { row, response }) => {
                        let result = appender
                            .append_row(appender_params_from_iter(row.iter()))
                            .map_err(AppenderError::Append);
                        let _ = response.send(result);
                    }
                    Ok(AppenderCommand::Close { response }) => {
                        let result = appender.flush().map_err(AppenderError::Flush);
                        break Some((result, response));
                    }
                    // Handle dropped without a close; the appender drop below
                    // still flushes what it can.
                    Err(_) => break None,
                }
            }
        };

        if let Err((_, e)) = conn.close() {
            tracing::warn!(schema, table, error = %e, "appender_connection_close_failed");
        }
        if let Some((result, response)) = outcome {
            let _ = response.send(result);
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Append one row, blocking until the worker has handled it.
    pub fn append(&self, row: Vec<Value>) -> Result<(), AppenderError> {
        let (tx, rx) = channel::bounded(1);
        self.command_tx
            .send(AppenderCommand::Append { row, response: tx })
            .map_err(|_| AppenderError::Terminated)?;
        rx.recv().map_err(|_| AppenderError::Terminated)?
    }

    /// Flush buffered rows, close the appender and its connection, and stop
    /// the worker.
    pub fn close(mut self) -> Result<(), AppenderError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), AppenderError> {
        let Some(handle) = self.worker_handle.take() else {
            return Ok(());
        };
        let (tx, rx) = channel::bounded(1);
        let result = match self.command_tx.send(AppenderCommand::Close { response: tx }) {
            Ok(()) => rx.recv().map_err(|_| AppenderError::Terminated).and_then(|r| r),
            Err(_) => Err(AppenderError::Terminated),
        };
        if handle.join().is_err() {
            return Err(AppenderError::Panicked);
        }
        tracing::debug!(schema = %self.schema, table = %self.table, "appender_closed");
        result
    }
}

impl Drop for AppenderWorker {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(
                schema = %self.schema,
                table = %self.table,
                error = %e,
                "appender_close_on_drop_failed"
            );
        }
    }
}
