//! A connection handle's database: one physical DuckDB connection.
//!
//! Cursors and appenders get their own connection cloned from this one,
//! which shares the underlying database instance. Clones must be closed
//! before the connection that opened the database.

use duckdb::types::Value;
use duckdb::{params_from_iter, Connection, Statement};

use crate::protocol::error::RpcError;

/// Fully collected result of an immediate query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug)]
pub struct Database {
    path: String,
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: &str) -> Result<Self, RpcError> {
        let conn = Connection::open(path).map_err(RpcError::Connect)?;
        tracing::info!(path, "database_opened");
        Ok(Self {
            path: path.to_string(),
            conn,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run a statement that produces no result set. Returns the number of
    /// rows changed.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, RpcError> {
        self.conn
            .execute(sql, params_from_iter(params.iter()))
            .map_err(RpcError::Query)
    }

    /// Run a query and collect its full result set. Meant for small results;
    /// large ones go through a [`Cursor`](crate::cursor::Cursor).
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<ResultSet, RpcError> {
        let mut stmt = self.conn.prepare(sql).map_err(RpcError::Query)?;
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(RpcError::Query)?;
        let columns = rows
            .as_ref()
            .map(Statement::column_names)
            .unwrap_or_default();

        let mut result = ResultSet {
            columns,
            rows: Vec::new(),
        };
        let width = result.columns.len();
        while let Some(row) = rows.next().map_err(RpcError::Fetch)? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(row.get::<_, Value>(idx).map_err(RpcError::Fetch)?);
            }
            result.rows.push(values);
        }
        Ok(result)
    }

    /// A second connection to the same database, for a cursor or appender
    /// worker.
    pub fn dedicated_connection(&self) -> Result<Connection, RpcError> {
        self.conn.try_clone().map_err(RpcError::Connect)
    }

    pub fn close(self) -> Result<(), RpcError> {
        let path = self.path;
        self.conn.close().map_err(|(_, e)| RpcError::Close(e))?;
        tracing::info!(path = %path, "database_closed");
        Ok(())
    }
}
