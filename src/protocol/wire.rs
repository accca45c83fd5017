//! Wire format for the line-delimited JSON protocol.
//!
//! Every request is one JSON object on one line, tagged by the `@` field.
//! Every response is one JSON object on one line carrying at least `ok`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use super::error::{RpcError, SessionError};

/// Field holding the command tag.
pub const COMMAND_KEY: &str = "@";

// ============================================================================
// Requests
// ============================================================================

/// A decoded request line before command-specific validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRequest {
    pub command: String,
    pub args: Args,
}

impl RawRequest {
    /// Decode one request line (without its trailing newline).
    ///
    /// Anything other than an object with a string `@` is a framing error.
    pub fn decode(line: &str) -> Result<Self, SessionError> {
        let value: Json = serde_json::from_str(line)?;
        let Json::Object(mut fields) = value else {
            return Err(SessionError::Framing("request is not an object"));
        };
        let command = match fields.remove(COMMAND_KEY) {
            Some(Json::String(command)) => command,
            Some(_) => return Err(SessionError::Framing("invalid method key")),
            None => return Err(SessionError::Framing("no method key")),
        };
        Ok(Self {
            command,
            args: Args(fields),
        })
    }
}

/// Command arguments with typed extraction.
///
/// Each accessor distinguishes an absent key from a key of the wrong type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Map<String, Json>);

impl Args {
    pub fn new(fields: Map<String, Json>) -> Self {
        Self(fields)
    }

    fn required(&self, key: &'static str) -> Result<&Json, RpcError> {
        self.0.get(key).ok_or(RpcError::MissingKey(key))
    }

    /// Non-negative integer. Integral floats such as `3.0` are accepted.
    pub fn uint(&self, key: &'static str) -> Result<u64, RpcError> {
        let value = self.required(key)?;
        if let Some(n) = value.as_u64() {
            return Ok(n);
        }
        match value.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
            _ => Err(RpcError::InvalidType(key)),
        }
    }

    pub fn string(&self, key: &'static str) -> Result<&str, RpcError> {
        self.required(key)?
            .as_str()
            .ok_or(RpcError::InvalidType(key))
    }

    /// String that may be absent or null.
    pub fn opt_string(&self, key: &'static str) -> Result<Option<&str>, RpcError> {
        match self.0.get(key) {
            None | Some(Json::Null) => Ok(None),
            Some(Json::String(s)) => Ok(Some(s)),
            Some(_) => Err(RpcError::InvalidType(key)),
        }
    }

    pub fn list(&self, key: &'static str) -> Result<&[Json], RpcError> {
        self.required(key)?
            .as_array()
            .map(Vec::as_slice)
            .ok_or(RpcError::InvalidType(key))
    }

    /// List that defaults to empty when absent or null.
    pub fn opt_list(&self, key: &'static str) -> Result<&[Json], RpcError> {
        match self.0.get(key) {
            None | Some(Json::Null) => Ok(&[]),
            Some(Json::Array(items)) => Ok(items),
            Some(_) => Err(RpcError::InvalidType(key)),
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// One response line.
///
/// Payload fields are optional and only serialized when set, so each command
/// carries just the fields it produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,

    /// Connection key
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<u64>,

    /// Cursor or appender key
    #[serde(rename = "h", default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<u64>,

    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Json>>,

    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eof: Option<bool>,

    /// Rows affected by an execute
    #[serde(rename = "aff", default, skip_serializing_if = "Option::is_none")]
    pub affected: Option<u64>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            err: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_connection(mut self, key: u64) -> Self {
        self.connection = Some(key);
        self
    }

    pub fn with_handle(mut self, key: u64) -> Self {
        self.handle = Some(key);
        self
    }

    pub fn with_rows(mut self, rows: Vec<Json>) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_eof(mut self, eof: bool) -> Self {
        self.eof = Some(eof);
        self
    }

    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = Some(affected);
        self
    }

    /// Encode as a single line without the trailing newline.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&RpcError> for Response {
    fn from(err: &RpcError) -> Self {
        Response::error(err.to_string())
    }
}
