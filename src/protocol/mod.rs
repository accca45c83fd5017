//! Stdio RPC Protocol
//!
//! Line-delimited JSON over stdin/stdout, one request and one response per
//! line, strictly in lockstep.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                      duckrpc protocol                       |
//! +-------------------------------------------------------------+
//! |  stdin line  ->  RawRequest (wire)  ->  Request (request)   |
//! |              ->  Session::handle (handler)  ->  Response    |
//! |  stdout line <-  Response::encode (wire)                    |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Module Structure
//!
//! - `wire` - Request framing, typed argument access, response shape
//! - `request` - Command tags and validated requests
//! - `error` - Per-request and fatal error types
//! - `handler` - One handler per command

pub mod error;
pub mod handler;
pub mod request;
pub mod wire;

pub use error::{RpcError, RpcResult, SessionError};
pub use request::Request;
pub use wire::{Args, RawRequest, Response};
