//! Query Cursor
//!
//! A positioned iterator over the rows of one query, fetched in batches.
//!
//! The statement runs on a worker thread that owns a dedicated connection and
//! a streaming result. Rows are pulled from the engine only when a fetch asks
//! for them, so opening a cursor over a huge result is cheap.
//!
//! ```text
//! Session                              worker thread "cursor:<conn>"
//! ───────                              ─────────────────────────────
//! open() ─────── start ──────────────► prepare, execute streaming
//!        ◄────── column names ──────── (loop exits here on failure)
//! fetch(n) ───── Fetch{n} ───────────► step up to n rows
//!          ◄──── Batch ───────────────
//! close() ────── Close ──────────────► drop result, close conn
//! ```
//!
//! Column names are captured when the cursor is opened and never re-read.

use crossbeam_channel as channel;
use duckdb::types::Value;
use duckdb::{params_from_iter, Connection, Rows};
use serde_json::Value as Json;

use crate::handles::HandleKey;
use crate::value::{self, ScanError};

/// Errors crossing the cursor worker boundary.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("spawn cursor worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("query: {0}")]
    Query(#[source] duckdb::Error),

    #[error("row scan: {0}")]
    Fetch(#[source] duckdb::Error),

    #[error("row scan: {0}")]
    Scan(#[from] ScanError),

    #[error("close cursor: worker panicked")]
    Panicked,

    #[error("cursor worker terminated")]
    Terminated,
}

/// Rows returned by one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub rows: Vec<Json>,
    /// Set once the underlying result has run out of rows.
    pub eof: bool,
}

enum CursorCommand {
    Fetch {
        count: usize,
        response: channel::Sender<Result<Batch, CursorError>>,
    },
    Close {
        response: channel::Sender<()>,
    },
}

#[derive(Debug)]
pub struct Cursor {
    conn: HandleKey,
    columns: Vec<String>,
    delivered: usize,
    command_tx: channel::Sender<CursorCommand>,
    worker_handle: Option<std::thread::JoinHandle<()>>,
}

impl Cursor {
    /// Run `sql` on `dedicated` (a clone of connection `conn`) and return a
    /// cursor positioned before the first row.
    ///
    /// Only the statement's execution is awaited; no row is read.
    pub fn open(
        conn: HandleKey,
        dedicated: Connection,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Self, CursorError> {
        let (command_tx, command_rx) = channel::bounded::<CursorCommand>(0);
        let (ready_tx, ready_rx) = channel::bounded(1);

        let sql = sql.to_string();
        let worker_handle = std::thread::Builder::new()
            .name(format!("cursor:{conn}"))
            .spawn(move || Self::worker_loop(dedicated, &sql, &params, &ready_tx, &command_rx))
            .map_err(CursorError::Spawn)?;

        let opened = ready_rx.recv().map_err(|_| CursorError::Terminated);
        match opened.and_then(|r| r) {
            Ok(columns) => Ok(Self {
                conn,
                columns,
                delivered: 0,
                command_tx,
                worker_handle: Some(worker_handle),
            }),
            Err(e) => {
                if worker_handle.join().is_err() {
                    return Err(CursorError::Panicked);
                }
                Err(e)
            }
        }
    }

    fn worker_loop(
        conn: Connection,
        sql: &str,
        params: &[Value],
        ready: &channel::Sender<Result<Vec<String>, CursorError>>,
        command_rx: &channel::Receiver<CursorCommand>,
    ) {
        let closed = {
            let mut stmt = match conn.prepare(sql) {
                Ok(stmt) => stmt,
                Err(e) => {
                    let _ = ready.send(Err(CursorError::Query(e)));
                    return;
                }
            };
            if let Err(e) = stmt.stream_arrow(params_from_iter(params.iter())) {
                let _ = ready.send(Err(CursorError::Query(e)));
                return;
            }
            let columns = stmt.column_names();
            let width = columns.len();
            let _ = ready.send(Ok(columns));

            let mut rows = stmt.raw_query();
            let mut exhausted = false;
            loop {
                match command_rx.recv() {
                    Ok(CursorCommand::Fetch { count, response }) => {
                        let batch = next_batch(&mut rows, width, count, &mut exhausted);
                        let _ = response.send(batch);
                    }
                    Ok(CursorCommand::Close { response }) => break Some(response),
                    Err(_) => break None,
                }
            }
        };

        if let Err((_, e)) = conn.close() {
            tracing::warn!(error = %e, "cursor_connection_close_failed");
        }
        if let Some(response) = closed {
            let _ = response.send(());
        }
    }

    /// Connection this cursor was opened on.
    pub fn connection(&self) -> HandleKey {
        self.conn
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows handed out so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Advance up to `count` rows.
    ///
    /// A cell that cannot be encoded fails the whole fetch; the rows converted
    /// so far in this call are dropped and the cursor stays positioned after
    /// the failing row. A zero-row fetch reports `eof` only when the end of
    /// the result has already been reached.
    pub fn fetch(&mut self, count: usize) -> Result<Batch, CursorError> {
        let (tx, rx) = channel::bounded(1);
        self.command_tx
            .send(CursorCommand::Fetch {
                count,
                response: tx,
            })
            .map_err(|_| CursorError::Terminated)?;
        let batch = rx.recv().map_err(|_| CursorError::Terminated)??;
        self.delivered += batch.rows.len();
        Ok(batch)
    }

    /// Drop the result and the dedicated connection, and stop the worker.
    pub fn close(mut self) -> Result<(), CursorError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), CursorError> {
        let Some(handle) = self.worker_handle.take() else {
            return Ok(());
        };
        let (tx, rx) = channel::bounded(1);
        let result = match self.command_tx.send(CursorCommand::Close { response: tx }) {
            Ok(()) => rx.recv().map_err(|_| CursorError::Terminated),
            Err(_) => Err(CursorError::Terminated),
        };
        if handle.join().is_err() {
            return Err(CursorError::Panicked);
        }
        tracing::debug!(conn = self.conn, rows = self.delivered, "cursor_closed");
        result
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(conn = self.conn, error = %e, "cursor_close_on_drop_failed");
        }
    }
}

fn next_batch(
    rows: &mut Rows<'_>,
    width: usize,
    count: usize,
    exhausted: &mut bool,
) -> Result<Batch, CursorError> {
    let mut batch = Vec::new();
    while batch.len() < count && !*exhausted {
        let Some(row) = rows.next().map_err(CursorError::Fetch)? else {
            *exhausted = true;
            break;
        };
        let mut cells = Vec::with_capacity(width);
        for idx in 0..width {
            cells.push(row.get::<_, Value>(idx).map_err(CursorError::Fetch)?);
        }
        batch.push(value::row_to_json(&cells)?);
    }
    Ok(Batch {
        rows: batch,
        eof: *exhausted,
    })
}
