//! JSON-RPC 2.0 wire types and line-level encode/decode.
//!
//! The wire format is newline-delimited UTF-8 JSON over the worker's stdin
//! (client → worker) and stdout (worker → client). A request carries
//! `{jsonrpc: "2.0", method, params?, id}`; a response echoes the request's
//! id with exactly one of `result` or `error`.
//!
//! # Decode policy
//!
//! The worker may interleave non-protocol diagnostic text on stdout, so
//! classification is deliberately tolerant:
//!
//! - a line that is not valid JSON is a recoverable [`ClientError::Decode`];
//! - valid JSON that lacks a positive-integer `id` is silently ignored;
//! - everything else is a [`Response`] routed to the request registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RpcError;
use crate::{ClientError, Result};

/// Protocol version string stamped on every request and response.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method names understood by the task-index worker.
///
/// Thin convenience constants so callers do not scatter string literals;
/// the params/result payloads stay opaque [`Value`]s validated by the worker.
pub mod methods {
    /// Scan the workspace for task labels.
    pub const SCAN_PROJECT: &str = "scan_project";
    /// Fetch tasks, optionally filtered by section or status.
    pub const GET_TASKS: &str = "get_tasks";
    /// Change a single task's status.
    pub const UPDATE_TASK_STATUS: &str = "update_task_status";
    /// Create a task in a section.
    pub const CREATE_TASK: &str = "create_task";
    /// Delete a task from a section.
    pub const DELETE_TASK: &str = "delete_task";
    /// Locate source references to a task.
    pub const FIND_TASK_REFERENCES: &str = "find_task_references";
    /// Free-text search across tasks.
    pub const SEARCH_TASKS: &str = "search_tasks";
    /// Aggregate statistics over the task index.
    pub const GET_STATISTICS: &str = "get_statistics";
}

/// Outbound JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Opaque method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlation id; positive and unique per connection.
    pub id: u64,
}

impl JsonRpcRequest {
    /// Build a request with the given correlation id.
    #[must_use]
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.to_owned(),
            params,
            id,
        }
    }

    /// Serialise to a single compact JSON line (without the trailing `\n`;
    /// the codec appends the delimiter).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if serialisation fails, which cannot
    /// happen for values built from [`Value`] params.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ClientError::Decode(format!("failed to serialise request: {e}")))
    }
}

/// Inbound JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version echoed by the worker.
    pub jsonrpc: String,
    /// Success payload; absent when `error` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload; absent when `result` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Echo of the originating request's id. The worker may answer
    /// malformed lines with a null id; those never match a pending entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

/// A response whose id matched the shape this client issues.
#[derive(Debug, Clone)]
pub struct Response {
    /// Correlation id echoed from the request.
    pub id: u64,
    /// Success payload (`Value::Null` when the worker omitted it).
    pub result: Option<Value>,
    /// Error payload.
    pub error: Option<RpcError>,
}

/// Classify one decoded line from the worker's stdout.
///
/// # Return value
///
/// - `Ok(Some(response))` — a response with a positive-integer id.
/// - `Ok(None)` — blank line, or valid JSON without a usable id
///   (diagnostic text, notifications); skipped, logged by the caller.
/// - `Err(ClientError::Decode)` — not valid JSON; recoverable.
///
/// # Errors
///
/// [`ClientError::Decode`] when the line is not well-formed JSON.
pub fn classify_line(line: &str) -> Result<Option<Response>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ClientError::Decode(format!("malformed json: {e}")))?;

    let Some(id) = value.get("id").and_then(Value::as_u64) else {
        // JSON without a correlation id is tolerated non-protocol output.
        return Ok(None);
    };

    let response: JsonRpcResponse = serde_json::from_value(value)
        .map_err(|e| ClientError::Decode(format!("malformed response: {e}")))?;

    Ok(Some(Response {
        id,
        result: response.result,
        error: response.error,
    }))
}
