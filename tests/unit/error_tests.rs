//! Unit tests for the error taxonomy.

use std::time::Duration;

use serde_json::json;

use taskpipe::{ClientError, RpcError};

/// Standard JSON-RPC error constructors carry the reserved codes.
#[test]
fn standard_rpc_error_codes() {
    assert_eq!(RpcError::parse_error().code, -32700);
    assert_eq!(RpcError::invalid_request().code, -32600);
    assert_eq!(RpcError::method_not_found().code, -32601);
    assert_eq!(RpcError::invalid_params().code, -32602);
}

/// The wire error object round-trips through serde including `data`.
#[test]
fn rpc_error_serde_round_trip() {
    let error = RpcError {
        code: -32000,
        message: "task not found".to_owned(),
        data: Some(json!({"section": "core", "task_id": "T-1"})),
    };
    let line = serde_json::to_string(&error).expect("serialise");
    let back: RpcError = serde_json::from_str(&line).expect("deserialise");
    assert_eq!(back, error);
}

/// `data: None` is omitted from the wire form entirely.
#[test]
fn absent_data_is_not_serialised() {
    let line = serde_json::to_string(&RpcError::method_not_found()).expect("serialise");
    assert!(!line.contains("data"));
}

/// Display output names the failure mode for every variant.
#[test]
fn display_is_descriptive() {
    let timeout = ClientError::Timeout {
        method: "scan_project".to_owned(),
        after: Duration::from_secs(30),
    };
    assert!(timeout.to_string().contains("scan_project"));

    assert!(ClientError::NotConnected.to_string().contains("not connected"));
    assert!(ClientError::Launch("spawn failed".into())
        .to_string()
        .contains("spawn failed"));
    assert!(ClientError::Rpc(RpcError::method_not_found())
        .to_string()
        .contains("-32601"));
}

/// I/O errors convert into the crate error type.
#[test]
fn io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: ClientError = io.into();
    assert!(matches!(err, ClientError::Io(_)));
}
