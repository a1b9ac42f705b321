//! Integration tests for the request/response flow against scripted workers.
//!
//! Each test spawns a real `sh` subprocess that prints a ready line and
//! replays canned NDJSON responses, exercising spawn, framing, correlation,
//! and completion end to end.

use serde_json::json;

use taskpipe::protocol::methods;
use taskpipe::{ClientError, RpcClient};

use super::test_helpers::scripted_worker;

/// The worker echoes a result before the deadline; the handle resolves
/// with exactly that payload.
#[tokio::test]
async fn response_before_timeout_resolves_with_result() {
    let script = r#"
        echo ready
        read line
        echo '{"jsonrpc":"2.0","id":1,"result":{"x":1}}'
        sleep 1
    "#;
    let client = RpcClient::new(scripted_worker(script));
    client.connect().await.expect("connect");

    let result = client
        .request("echo", Some(json!({"x": 1})))
        .await
        .expect("resolved");
    assert_eq!(result, json!({"x": 1}));

    client.disconnect().await;
}

/// A worker that never replies rejects the request with `Timeout` at the
/// configured deadline; the id is removed and the connection stays usable.
#[tokio::test]
async fn silent_worker_rejects_with_timeout() {
    let script = r#"
        echo ready
        sleep 30
    "#;
    let mut config = scripted_worker(script);
    config.request_timeout_seconds = 1;
    let client = RpcClient::new(config);
    client.connect().await.expect("connect");

    let outcome = client.request("slow_method", None).await;
    match outcome {
        Err(ClientError::Timeout { method, .. }) => assert_eq!(method, "slow_method"),
        other => panic!("expected timeout, got {other:?}"),
    }

    // Only the affected request died; the connection itself is intact.
    assert!(client.is_connected());
    assert_eq!(client.pending_requests().await, 0);

    client.disconnect().await;
}

/// Two in-flight requests answered in reverse order each resolve
/// independently with their own result.
#[tokio::test]
async fn out_of_order_responses_route_by_id() {
    let script = r#"
        echo ready
        read a
        read b
        echo '{"jsonrpc":"2.0","id":2,"result":{"who":"second"}}'
        echo '{"jsonrpc":"2.0","id":1,"result":{"who":"first"}}'
        sleep 1
    "#;
    let client = RpcClient::new(scripted_worker(script));
    client.connect().await.expect("connect");

    let (first, second) = tokio::join!(
        client.request(methods::GET_TASKS, None),
        client.request(methods::GET_TASKS, None),
    );

    assert_eq!(first.expect("first resolved"), json!({"who": "first"}));
    assert_eq!(second.expect("second resolved"), json!({"who": "second"}));

    client.disconnect().await;
}

/// An explicit error response rejects the handle with `Rpc` carrying the
/// worker's code and message verbatim.
#[tokio::test]
async fn error_response_rejects_with_rpc_error() {
    let script = r#"
        echo ready
        read line
        echo '{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}'
        sleep 1
    "#;
    let client = RpcClient::new(scripted_worker(script));
    client.connect().await.expect("connect");

    let outcome = client.request("no_such_method", None).await;
    match outcome {
        Err(ClientError::Rpc(err)) => {
            assert_eq!(err.code, -32601);
            assert_eq!(err.message, "Method not found");
        }
        other => panic!("expected rpc error, got {other:?}"),
    }

    client.disconnect().await;
}

/// Responses with unknown ids and non-protocol chatter on stdout are
/// dropped without disturbing the real response.
#[tokio::test]
async fn stray_lines_and_unknown_ids_are_ignored() {
    let script = r#"
        echo ready
        echo '{"jsonrpc":"2.0","id":99,"result":{"stale":true}}'
        echo 'worker diagnostic text, not JSON'
        echo '{"note":"json without an id"}'
        read line
        echo '{"jsonrpc":"2.0","id":1,"result":"ok"}'
        sleep 1
    "#;
    let client = RpcClient::new(scripted_worker(script));
    client.connect().await.expect("connect");

    let result = client.request(methods::GET_TASKS, None).await.expect("resolved");
    assert_eq!(result, json!("ok"));
    assert!(client.is_connected());

    client.disconnect().await;
}

/// A line past the 1 MiB framing limit is discarded without killing the
/// connection; the response that follows it still resolves.
#[tokio::test]
async fn oversized_line_is_discarded_and_stream_continues() {
    // 2 MiB of 'A' on one line, then the real response.
    let script = r#"
        echo ready
        read line
        head -c 2097152 /dev/zero | tr '\0' 'A'
        echo
        echo '{"jsonrpc":"2.0","id":1,"result":"survived"}'
        sleep 1
    "#;
    let client = RpcClient::new(scripted_worker(script));
    client.connect().await.expect("connect");

    let result = client.request(methods::GET_TASKS, None).await.expect("resolved");
    assert_eq!(result, json!("survived"));
    assert!(client.is_connected());
    assert_eq!(client.pending_requests().await, 0);

    client.disconnect().await;
}

/// A response split across stdout writes still arrives as one message.
#[tokio::test]
async fn split_response_line_is_reassembled() {
    let script = r#"
        echo ready
        read line
        printf '{"jsonrpc":"2.0","id":1,'
        sleep 0.1
        printf '"result":{"joined":true}}\n'
        sleep 1
    "#;
    let client = RpcClient::new(scripted_worker(script));
    client.connect().await.expect("connect");

    let result = client.request(methods::GET_TASKS, None).await.expect("resolved");
    assert_eq!(result, json!({"joined": true}));

    client.disconnect().await;
}
