//! # duckrpc
//!
//! A line-delimited JSON RPC server exposing DuckDB over stdin/stdout.
//!
//! Clients open connections, run statements, stream query results through
//! cursors and bulk-load tables through appenders. Every server-side
//! resource is addressed by an integer handle.
//!
//! ## Module Structure
//!
//! - `handles` - Monotonic handle registry
//! - `value` - JSON ⇄ DuckDB value conversion
//! - `database` - One DuckDB connection per connection handle
//! - `cursor` - Streaming result cursors on worker threads
//! - `appender` - Threaded appender worker
//! - `protocol` - Wire format, requests, errors and command handlers
//! - `session` - The request loop and resource ownership
//! - `config` - Layered configuration
//! - `logging` - Tracing subscriber setup

pub mod appender;
pub mod config;
pub mod cursor;
pub mod database;
pub mod handles;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod value;

pub use config::Config;
pub use handles::{HandleKey, HandleTable};
pub use protocol::{Request, Response, RpcError, SessionError};
pub use session::{Session, SessionState};
