//! JSON-RPC style envelopes for the stdio server

use serde::{Deserialize, Serialize};

/// Incoming request line
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub method: String,
    pub params: Option<serde_json::Value>,
}

/// Either request shape accepted on one input line
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IncomingLine {
    Rpc(Request),
    /// `["findExtent", fc]` / `["clipTaskDataAndFilter", grid, fc]`
    Positional(Vec<serde_json::Value>),
}

/// Error reply for requests that never reached the worker
#[derive(Debug, Serialize)]
pub struct Response {
    pub id: Option<serde_json::Value>,
    pub error: ErrorResponse,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub message: String,
}

impl Response {
    pub fn error(id: Option<serde_json::Value>, code: i32, message: String) -> Self {
        Response {
            id,
            error: ErrorResponse { code, message },
        }
    }
}

/// Standard JSON-RPC error codes
pub mod error_codes {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}
