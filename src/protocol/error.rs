//! Error types for the stdio RPC protocol.
//!
//! Two tiers: [`RpcError`] is answered with `{"ok":false,"err":...}` and the
//! session keeps running; [`SessionError`] aborts the session loop.

use crate::appender::AppenderError;
use crate::cursor::CursorError;
use crate::value::{ScanError, ValueError};

/// Recoverable per-request error. `Display` is the wire `err` string.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    // Argument errors
    #[error("missing key: {0}")]
    MissingKey(&'static str),

    #[error("invalid type for key: {0}")]
    InvalidType(&'static str),

    #[error("invalid value for key: {key} ({source})")]
    InvalidValue {
        key: &'static str,
        source: ValueError,
    },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Row `index` of an appender insert is not a list
    #[error("incorrect row type: expected array (at {0})")]
    RowShape(usize),

    // Lookup errors
    #[error("no such connection")]
    NoSuchConnection,

    #[error("no such handle")]
    NoSuchHandle,

    #[error("no such query")]
    NoSuchQuery,

    // Engine errors
    #[error("connect: {0}")]
    Connect(duckdb::Error),

    #[error("query: {0}")]
    Query(duckdb::Error),

    #[error("row scan: {0}")]
    Scan(#[from] ScanError),

    #[error("row scan: {0}")]
    Fetch(duckdb::Error),

    #[error("close: {0}")]
    Close(duckdb::Error),

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Appender(#[from] AppenderError),
}

impl RpcError {
    /// Whether the error came from the database engine rather than from the
    /// request itself.
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            RpcError::Connect(_)
                | RpcError::Query(_)
                | RpcError::Scan(_)
                | RpcError::Fetch(_)
                | RpcError::Close(_)
                | RpcError::Cursor(_)
                | RpcError::Appender(_)
        )
    }
}

/// Fatal error that ends the session loop.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("read request: {0}")]
    Read(#[source] std::io::Error),

    #[error("write response: {0}")]
    Write(#[source] std::io::Error),

    #[error("decode request: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Framing(&'static str),
}

pub type RpcResult<T> = Result<T, RpcError>;
