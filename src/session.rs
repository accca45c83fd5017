//! Session / Protocol Engine
//!
//! Drives one client over a line-delimited JSON pipe. A session owns every
//! server-side resource the client opened, each referenced by an integer
//! handle from its own table.
//!
//! ## Architecture
//!
//! ```text
//! Session
//! ├── connections: HandleTable<Database>
//! ├── cursors:     HandleTable<Cursor>        (each tagged with its connection)
//! │                    └── worker thread ── dedicated connection + streaming result
//! └── appenders:   HandleTable<OpenAppender>  (each tagged with its connection)
//!                      └── AppenderWorker ── thread + dedicated connection
//! ```
//!
//! ## Lifecycle
//!
//! 1. `{"ok":true}` is written before the first request is read
//! 2. each request line yields exactly one response line
//! 3. `x` tears everything down and answers `{"ok":true}`
//! 4. end of input (or a final line without a newline) tears down silently
//!
//! A line that is not JSON, is not an object, or has no string `@` tag is
//! fatal: resources are released and the error is returned to the caller.
//!
//! Teardown order is always cursors, then appenders, then connections, since
//! cursor and appender workers hold clones of their connection's database.

use std::io::{BufRead, Write};

use crate::appender::AppenderWorker;
use crate::config::{Config, ProtocolConfig};
use crate::cursor::Cursor;
use crate::database::Database;
use crate::handles::{HandleKey, HandleTable};
use crate::protocol::{RawRequest, Request, Response, RpcError, SessionError};

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Terminated,
}

/// An appender together with the connection it was opened from.
#[derive(Debug)]
pub struct OpenAppender {
    pub conn: HandleKey,
    pub worker: AppenderWorker,
}

#[derive(Debug)]
pub struct Session {
    pub(crate) protocol: ProtocolConfig,
    pub(crate) default_schema: String,
    pub(crate) connections: HandleTable<Database>,
    pub(crate) cursors: HandleTable<Cursor>,
    pub(crate) appenders: HandleTable<OpenAppender>,
    pub(crate) state: SessionState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            protocol: config.protocol.clone(),
            default_schema: config.appender.default_schema.clone(),
            connections: HandleTable::new(),
            cursors: HandleTable::new(),
            appenders: HandleTable::new(),
            state: SessionState::Running,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub fn appender_count(&self) -> usize {
        self.appenders.len()
    }

    /// Serve requests from `input` until the end command, end of input, or a
    /// fatal error. All resources are released before this returns.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        mut input: R,
        mut output: W,
    ) -> Result<(), SessionError> {
        if self.state == SessionState::Terminated {
            return Ok(());
        }
        let result = write_response(&mut output, &Response::ok())
            .and_then(|()| self.serve(&mut input, &mut output));
        if let Err(e) = &result {
            tracing::error!(error = %e, "session_aborted");
        }
        self.close_all();
        self.state = SessionState::Terminated;
        result
    }

    fn serve<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), SessionError> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = input.read_line(&mut line).map_err(SessionError::Read)?;
            if read == 0 || !line.ends_with('\n') {
                tracing::debug!(truncated = read > 0, "end_of_input");
                return Ok(());
            }

            let raw = RawRequest::decode(line.trim_end_matches(['\n', '\r']))?;
            let response = self.process(&raw);
            write_response(output, &response)?;
            if self.state == SessionState::Terminated {
                return Ok(());
            }
        }
    }

    /// Handle one decoded request. After the end command the session is
    /// `Terminated` and the returned acknowledgement is its last response.
    pub fn process(&mut self, raw: &RawRequest) -> Response {
        tracing::debug!(command = %raw.command, "request");
        let request = match Request::parse(raw) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(command = %raw.command, error = %e, "request_rejected");
                return Response::from(&e);
            }
        };
        let name = request.name();
        match self.handle(request) {
            Ok(response) => response,
            Err(e) => {
                if e.is_engine_error() {
                    tracing::warn!(command = name, error = %e, "request_failed");
                } else {
                    tracing::debug!(command = name, error = %e, "request_failed");
                }
                Response::from(&e)
            }
        }
    }

    /// Release a connection and everything opened from it.
    ///
    /// Child cursors and appenders are always released; a failure closing an
    /// appender is logged. The connection's own close error is returned.
    pub(crate) fn release_connection(&mut self, conn: HandleKey) -> Result<(), RpcError> {
        let db = self
            .connections
            .release(conn)
            .ok_or(RpcError::NoSuchConnection)?;

        let cursors = self.cursors.release_where(|c| c.connection() == conn);
        let appenders = self.appenders.release_where(|a| a.conn == conn);
        let (cursor_count, appender_count) = (cursors.len(), appenders.len());
        for (key, cursor) in cursors {
            if let Err(e) = cursor.close() {
                tracing::warn!(conn, cursor = key, error = %e, "cascade_cursor_close_failed");
            }
        }
        for (key, open) in appenders {
            if let Err(e) = open.worker.close() {
                tracing::warn!(conn, appender = key, error = %e, "cascade_appender_close_failed");
            }
        }

        tracing::info!(
            conn,
            cursors = cursor_count,
            appenders = appender_count,
            "connection_released"
        );
        db.close()
    }

    /// Release every resource, children before their connections.
    pub fn close_all(&mut self) {
        let conns: Vec<HandleKey> = self.connections.iter().map(|(k, _)| k).collect();
        for conn in conns {
            if let Err(e) = self.release_connection(conn) {
                tracing::warn!(conn, error = %e, "connection_close_failed");
            }
        }
        // Orphans cannot exist, but never leave a worker thread behind.
        for (key, cursor) in self.cursors.drain() {
            if let Err(e) = cursor.close() {
                tracing::warn!(cursor = key, error = %e, "cursor_close_failed");
            }
        }
        for (key, open) in self.appenders.drain() {
            if let Err(e) = open.worker.close() {
                tracing::warn!(appender = key, error = %e, "appender_close_failed");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn write_response<W: Write>(output: &mut W, response: &Response) -> Result<(), SessionError> {
    serde_json::to_writer(&mut *output, response).map_err(|e| SessionError::Write(e.into()))?;
    output.write_all(b"\n").map_err(SessionError::Write)?;
    output.flush().map_err(SessionError::Write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as Input;

    fn run(input: &str) -> (Result<(), SessionError>, Vec<String>) {
        let mut session = Session::default();
        let mut output = Vec::new();
        let result = session.run(Input::new(input.as_bytes().to_vec()), &mut output);
        assert_eq!(session.state(), SessionState::Terminated);
        let lines = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        (result, lines)
    }

    #[test]
    fn test_banner_then_eof() {
        let (result, lines) = run("");
        assert!(result.is_ok());
        assert_eq!(lines, vec![r#"{"ok":true}"#]);
    }

    #[test]
    fn test_end_command_acknowledged() {
        let (result, lines) = run("{\"@\":\"x\"}\n{\"@\":\"d\",\"p\":\":memory:\"}\n");
        assert!(result.is_ok());
        assert_eq!(lines, vec![r#"{"ok":true}"#, r#"{"ok":true}"#]);
    }

    #[test]
    fn test_truncated_line_ends_silently() {
        let (result, lines) = run("{\"@\":\"d\",\"p\":\":memory:\"}\n{\"@\":\"x\"}");
        assert!(result.is_ok());
        assert_eq!(lines, vec![r#"{"ok":true}"#, r#"{"ok":true,"d":0}"#]);
    }

    #[test]
    fn test_unknown_command_continues() {
        let (result, lines) = run("{\"@\":\"zz\"}\n{\"@\":\"d\",\"p\":\":memory:\"}\n");
        assert!(result.is_ok());
        assert_eq!(lines[1], r#"{"ok":false,"err":"unknown command: zz"}"#);
        assert_eq!(lines[2], r#"{"ok":true,"d":0}"#);
    }

    #[test]
    fn test_malformed_line_is_fatal() {
        let (result, lines) = run("{\"@\":\"d\",\"p\":\":memory:\"}\nnot json\n{\"@\":\"x\"}\n");
        assert!(matches!(result, Err(SessionError::Decode(_))));
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_missing_tag_is_fatal() {
        let (result, lines) = run("{\"q\":\"select 1\"}\n");
        assert!(matches!(result, Err(SessionError::Framing("no method key"))));
        assert_eq!(lines, vec![r#"{"ok":true}"#]);
    }

    #[test]
    fn test_crlf_lines_accepted() {
        let (result, lines) = run("{\"@\":\"d\",\"p\":\":memory:\"}\r\n{\"@\":\"x\"}\r\n");
        assert!(result.is_ok());
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_close_all_releases_everything() {
        let mut session = Session::default();
        let conn = session
            .connections
            .insert(Database::open(":memory:").unwrap());
        session
            .connections
            .get(conn)
            .unwrap()
            .execute("CREATE TABLE t (x INTEGER)", &[])
            .unwrap();
        let worker = AppenderWorker::spawn(
            session
                .connections
                .get(conn)
                .unwrap()
                .dedicated_connection()
                .unwrap(),
            "main",
            "t",
        )
        .unwrap();
        session.appenders.insert(OpenAppender { conn, worker });
        let cursor = Cursor::open(
            conn,
            session
                .connections
                .get(conn)
                .unwrap()
                .dedicated_connection()
                .unwrap(),
            "SELECT * FROM range(10)",
            vec![],
        )
        .unwrap();
        session.cursors.insert(cursor);

        session.close_all();
        assert_eq!(session.connection_count(), 0);
        assert_eq!(session.appender_count(), 0);
        assert_eq!(session.cursor_count(), 0);
    }

    #[test]
    fn test_end_command_terminates() {
        let mut session = Session::default();
        let connect = RawRequest::decode(r#"{"@":"d","p":":memory:"}"#).unwrap();
        session.process(&connect);
        let end = RawRequest::decode(r#"{"@":"x"}"#).unwrap();
        assert_eq!(session.process(&end), Response::ok());
        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(session.connection_count(), 0);
    }

    #[test]
    fn test_release_unknown_connection() {
        let mut session = Session::default();
        assert!(matches!(
            session.release_connection(3),
            Err(RpcError::NoSuchConnection)
        ));
    }
}
