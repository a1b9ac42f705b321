//! Error types shared across the crate.
//!
//! Every outstanding request is guaranteed to terminate with exactly one of
//! these: a result, [`ClientError::Rpc`], [`ClientError::Timeout`], or
//! [`ClientError::ConnectionLost`]. The remaining variants cover launch,
//! framing, and bootstrap failures.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error object carried by a JSON-RPC error response.
///
/// Propagated verbatim from the wire: `{code, message, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code (JSON-RPC reserves the `-32xxx` range).
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional method-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// `-32700` — the worker could not parse the request line.
    #[must_use]
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "Parse error".to_owned(),
            data: None,
        }
    }

    /// `-32600` — the request object was not a valid request.
    #[must_use]
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "Invalid Request".to_owned(),
            data: None,
        }
    }

    /// `-32601` — the requested method does not exist on the worker.
    #[must_use]
    pub fn method_not_found() -> Self {
        Self {
            code: -32601,
            message: "Method not found".to_owned(),
            data: None,
        }
    }

    /// `-32602` — the params object did not match the method's schema.
    #[must_use]
    pub fn invalid_params() -> Self {
        Self {
            code: -32602,
            message: "Invalid params".to_owned(),
            data: None,
        }
    }
}

impl Display for RpcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

/// Client error enumeration covering all failure modes of the core.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Worker process failed to spawn or a standard stream was unavailable.
    Launch(String),
    /// A request was issued while the client was not connected.
    NotConnected,
    /// No response arrived before the per-request deadline.
    Timeout {
        /// Method name of the request that timed out.
        method: String,
        /// Deadline that elapsed.
        after: Duration,
    },
    /// The worker explicitly returned an error response.
    Rpc(RpcError),
    /// Worker exited or the transport failed with requests outstanding.
    ConnectionLost(String),
    /// A line on the output stream could not be decoded; recoverable.
    Decode(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Configuration parsing or validation failure.
    Config(String),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::NotConnected => write!(f, "not connected to a worker process"),
            Self::Timeout { method, after } => {
                write!(f, "timeout: no response to '{method}' within {after:?}")
            }
            Self::Rpc(err) => write!(f, "{err}"),
            Self::ConnectionLost(msg) => write!(f, "connection lost: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
