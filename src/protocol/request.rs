//! Typed requests, one variant per command tag.

use duckdb::types::Value;
use serde_json::Value as Json;

use super::error::RpcError;
use super::wire::{Args, RawRequest};
use crate::handles::HandleKey;
use crate::value;

/// Command tags as they appear in the `@` field.
pub mod tag {
    pub const CONNECT: &str = "d";
    pub const CONNECT_ALIAS: &str = "c";
    pub const DISCONNECT: &str = "-d";
    pub const EXECUTE: &str = "e";
    pub const END: &str = "x";
    pub const QUERY_IMMEDIATE: &str = "qq";
    pub const QUERY_OPEN: &str = "q";
    pub const QUERY_FETCH: &str = "qf";
    pub const QUERY_RELEASE: &str = "qx";
    pub const APPENDER_OPEN: &str = "a";
    pub const APPENDER_INSERT: &str = "ai";
    pub const APPENDER_RELEASE: &str = "ax";
}

/// A validated request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Connect {
        path: String,
    },
    Disconnect {
        conn: HandleKey,
    },
    Execute {
        conn: HandleKey,
        sql: String,
        params: Vec<Value>,
    },
    End,
    QueryImmediate {
        conn: HandleKey,
        sql: String,
        params: Vec<Value>,
    },
    QueryOpen {
        conn: HandleKey,
        sql: String,
        params: Vec<Value>,
    },
    QueryFetch {
        cursor: HandleKey,
        count: u64,
    },
    QueryRelease {
        cursor: HandleKey,
    },
    AppenderOpen {
        conn: HandleKey,
        table: String,
        schema: Option<String>,
    },
    /// Rows stay as raw JSON until the appender handle is resolved.
    AppenderInsert {
        appender: HandleKey,
        rows: Vec<Json>,
    },
    AppenderRelease {
        appender: HandleKey,
    },
}

impl Request {
    /// Validate a raw request against its command's argument schema.
    pub fn parse(raw: &RawRequest) -> Result<Self, RpcError> {
        let args = &raw.args;
        let request = match raw.command.as_str() {
            tag::CONNECT | tag::CONNECT_ALIAS => Request::Connect {
                path: args.string("p")?.to_string(),
            },
            tag::DISCONNECT => Request::Disconnect {
                conn: args.uint("d")?,
            },
            tag::EXECUTE => {
                let (conn, sql, params) = statement_args(args)?;
                Request::Execute { conn, sql, params }
            }
            tag::END => Request::End,
            tag::QUERY_IMMEDIATE => {
                let (conn, sql, params) = statement_args(args)?;
                Request::QueryImmediate { conn, sql, params }
            }
            tag::QUERY_OPEN => {
                let (conn, sql, params) = statement_args(args)?;
                Request::QueryOpen { conn, sql, params }
            }
            tag::QUERY_FETCH => Request::QueryFetch {
                cursor: args.uint("h")?,
                count: args.uint("n")?,
            },
            tag::QUERY_RELEASE => Request::QueryRelease {
                cursor: args.uint("h")?,
            },
            tag::APPENDER_OPEN => Request::AppenderOpen {
                conn: args.uint("d")?,
                table: args.string("t")?.to_string(),
                schema: args.opt_string("s")?.map(str::to_string),
            },
            tag::APPENDER_INSERT => Request::AppenderInsert {
                appender: args.uint("h")?,
                rows: args.list("r")?.to_vec(),
            },
            tag::APPENDER_RELEASE => Request::AppenderRelease {
                appender: args.uint("h")?,
            },
            other => return Err(RpcError::UnknownCommand(other.to_string())),
        };
        Ok(request)
    }

    /// Tag used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Connect { .. } => "connect",
            Request::Disconnect { .. } => "disconnect",
            Request::Execute { .. } => "execute",
            Request::End => "end",
            Request::QueryImmediate { .. } => "query_immediate",
            Request::QueryOpen { .. } => "query_open",
            Request::QueryFetch { .. } => "query_fetch",
            Request::QueryRelease { .. } => "query_release",
            Request::AppenderOpen { .. } => "appender_open",
            Request::AppenderInsert { .. } => "appender_insert",
            Request::AppenderRelease { .. } => "appender_release",
        }
    }
}

fn statement_args(args: &Args) -> Result<(HandleKey, String, Vec<Value>), RpcError> {
    let conn = args.uint("d")?;
    let sql = args.string("q")?.to_string();
    let params = value::from_json_list(args.opt_list("p")?)
        .map_err(|source| RpcError::InvalidValue { key: "p", source })?;
    Ok((conn, sql, params))
}

/// Validate row `index` of an appender insert: a list of scalar cells.
pub fn appender_row(index: usize, row: &Json) -> Result<Vec<Value>, RpcError> {
    let cells = row.as_array().ok_or(RpcError::RowShape(index))?;
    value::from_json_list(cells).map_err(|source| RpcError::InvalidValue { key: "r", source })
}
