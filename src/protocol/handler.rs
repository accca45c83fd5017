//! Command handlers.
//!
//! One method per command. Each validates its handles, performs the database
//! work and builds the command's own response; errors are turned into
//! `{"ok":false}` lines by the session.

use duckdb::types::Value;
use serde_json::Value as Json;

use super::error::{RpcError, RpcResult};
use super::request::{self, Request};
use super::wire::Response;
use crate::appender::{AppenderError, AppenderWorker};
use crate::cursor::Cursor;
use crate::database::Database;
use crate::handles::HandleKey;
use crate::session::{OpenAppender, Session, SessionState};
use crate::value;

impl Session {
    /// Dispatch a validated request.
    pub fn handle(&mut self, request: Request) -> RpcResult<Response> {
        match request {
            Request::Connect { path } => self.connect(&path),
            Request::Disconnect { conn } => self.disconnect(conn),
            Request::Execute { conn, sql, params } => self.execute(conn, &sql, &params),
            Request::QueryImmediate { conn, sql, params } => {
                self.query_immediate(conn, &sql, &params)
            }
            Request::QueryOpen { conn, sql, params } => self.query_open(conn, &sql, params),
            Request::QueryFetch { cursor, count } => self.query_fetch(cursor, count),
            Request::QueryRelease { cursor } => self.query_release(cursor),
            Request::AppenderOpen {
                conn,
                table,
                schema,
            } => self.appender_open(conn, &table, schema),
            Request::AppenderInsert { appender, rows } => self.appender_insert(appender, &rows),
            Request::AppenderRelease { appender } => self.appender_release(appender),
            Request::End => self.end(),
        }
    }

    /// Release everything and stop the session. The acknowledgement is the
    /// last line the session writes.
    fn end(&mut self) -> RpcResult<Response> {
        self.close_all();
        self.state = SessionState::Terminated;
        tracing::debug!("session_ended");
        Ok(Response::ok())
    }

    fn database(&self, conn: HandleKey) -> RpcResult<&Database> {
        self.connections
            .get(conn)
            .ok_or(RpcError::NoSuchConnection)
    }

    // ========================================================================
    // Connections
    // ========================================================================

    fn connect(&mut self, path: &str) -> RpcResult<Response> {
        let db = Database::open(path)?;
        let key = self.connections.insert(db);
        tracing::info!(conn = key, path, "connected");
        Ok(Response::ok().with_connection(key))
    }

    fn disconnect(&mut self, conn: HandleKey) -> RpcResult<Response> {
        self.release_connection(conn)?;
        tracing::info!(conn, "disconnected");
        Ok(Response::ok())
    }

    fn execute(&mut self, conn: HandleKey, sql: &str, params: &[Value]) -> RpcResult<Response> {
        let changed = self.database(conn)?.execute(sql, params)?;
        let response = Response::ok();
        if self.protocol.report_affected_rows {
            return Ok(response.with_affected(changed as u64));
        }
        Ok(response)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn query_immediate(
        &mut self,
        conn: HandleKey,
        sql: &str,
        params: &[Value],
    ) -> RpcResult<Response> {
        let result = self.database(conn)?.query(sql, params)?;
        let rows = result
            .rows
            .iter()
            .map(|row| value::row_to_json(row))
            .collect::<Result<Vec<Json>, _>>()?;
        Ok(Response::ok().with_rows(rows).with_columns(result.columns))
    }

    fn query_open(&mut self, conn: HandleKey, sql: &str, params: Vec<Value>) -> RpcResult<Response> {
        let dedicated = self.database(conn)?.dedicated_connection()?;
        let cursor = Cursor::open(conn, dedicated, sql, params)?;
        let columns = cursor.columns().to_vec();
        let key = self.cursors.insert(cursor);
        tracing::debug!(conn, cursor = key, "cursor_opened");
        Ok(Response::ok().with_handle(key).with_columns(columns))
    }

    fn query_fetch(&mut self, cursor: HandleKey, count: u64) -> RpcResult<Response> {
        let max = self.protocol.max_fetch_rows;
        let cursor = self.cursors.get_mut(cursor).ok_or(RpcError::NoSuchHandle)?;
        let mut count = usize::try_from(count).unwrap_or(usize::MAX);
        if max > 0 {
            count = count.min(max);
        }
        let batch = cursor.fetch(count)?;
        Ok(Response::ok().with_rows(batch.rows).with_eof(batch.eof))
    }

    fn query_release(&mut self, cursor: HandleKey) -> RpcResult<Response> {
        let open = self.cursors.release(cursor).ok_or(RpcError::NoSuchQuery)?;
        open.close()?;
        tracing::debug!(cursor, "cursor_released");
        Ok(Response::ok())
    }

    // ========================================================================
    // Appenders
    // ========================================================================

    fn appender_open(
        &mut self,
        conn: HandleKey,
        table: &str,
        schema: Option<String>,
    ) -> RpcResult<Response> {
        let dedicated = self.database(conn)?.dedicated_connection()?;
        let schema = schema.unwrap_or_else(|| self.default_schema.clone());
        let worker = AppenderWorker::spawn(dedicated, &schema, table)?;
        let key = self.appenders.insert(OpenAppender { conn, worker });
        tracing::info!(conn, appender = key, schema = %schema, table, "appender_opened");
        Ok(Response::ok().with_handle(key))
    }

    /// Rows are validated and appended one at a time, in order. The first bad
    /// row fails the call; rows before it stay appended.
    fn appender_insert(&mut self, appender: HandleKey, rows: &[Json]) -> RpcResult<Response> {
        let open = self.appenders.get(appender).ok_or(RpcError::NoSuchHandle)?;
        for (index, row) in rows.iter().enumerate() {
            let cells = request::appender_row(index, row)?;
            if let Err(e) = open.worker.append(cells) {
                return Err(self.discard_appender(appender, e));
            }
        }
        tracing::debug!(appender, rows = rows.len(), "appender_rows_inserted");
        Ok(Response::ok())
    }

    /// The worker reported an engine failure: the handle is dead.
    fn discard_appender(&mut self, appender: HandleKey, cause: AppenderError) -> RpcError {
        if let Some(dead) = self.appenders.release(appender) {
            if let Err(close_err) = dead.worker.close() {
                tracing::warn!(appender, error = %close_err, "dead_appender_close_failed");
            }
        }
        tracing::warn!(appender, error = %cause, "appender_released_after_error");
        cause.into()
    }

    fn appender_release(&mut self, appender: HandleKey) -> RpcResult<Response> {
        let open = self
            .appenders
            .release(appender)
            .ok_or(RpcError::NoSuchHandle)?;
        open.worker.close()?;
        tracing::info!(appender, "appender_released");
        Ok(Response::ok())
    }
}
