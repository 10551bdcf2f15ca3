//! JSON-RPC over the line transport, end to end.

mod common;

use std::sync::Arc;

use common::GatewayHarness;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};
use tokio_util::sync::CancellationToken;
use warden_gateway::{Dispatcher, PROTOCOL_VERSION, serve};

async fn session(harness: &GatewayHarness, requests: &[Value]) -> Vec<Value> {
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&harness.gateway), 1 << 20));
    let (mut client, server_in) = duplex(1 << 16);
    let (server_out, client_out) = duplex(1 << 16);

    for request in requests {
        client.write_all(request.to_string().as_bytes()).await.unwrap();
        client.write_all(b"\n").await.unwrap();
    }
    client.shutdown().await.unwrap();

    serve(dispatcher, server_in, server_out, CancellationToken::new())
        .await
        .unwrap();

    let mut lines = BufReader::new(client_out).lines();
    let mut responses = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        responses.push(serde_json::from_str::<Value>(&line).unwrap());
    }
    responses.sort_by_key(|r| r["id"].as_i64().unwrap_or(-1));
    responses
}

fn call(id: i64, name: &str, principal: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {
            "name": name,
            "arguments": arguments,
            "principal": {"id": principal},
            "correlationId": format!("rpc-{id}"),
        }
    })
}

#[tokio::test]
async fn test_handshake_and_catalogue() {
    let harness = GatewayHarness::new();
    let responses = session(
        &harness,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                   "params": {"protocolVersion": PROTOCOL_VERSION, "clientInfo": {"name": "it"}}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "list_tools", "params": {}}),
        ],
    )
    .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "warden-test");

    let names: Vec<&str> = responses[1]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, ["kubernetes_get", "kubernetes_delete", "echo", "slow"]);
}

#[tokio::test]
async fn test_outcome_shapes() {
    let harness = GatewayHarness::new();
    let responses = session(
        &harness,
        &[
            call(1, "echo", "charlie", json!({"message": "hi"})),
            call(
                2,
                "kubernetes_delete",
                "charlie",
                json!({"resource_type": "pods", "name": "web"}),
            ),
            call(3, "kubernetes_get", "charlie", json!({"resource_type": "pods"})),
            call(4, "echo", "charlie", json!({"message": "$(id)"})),
        ],
    )
    .await;
    assert_eq!(responses.len(), 4);

    let completed = &responses[0]["result"];
    assert_eq!(completed["status"], "Completed");
    assert_eq!(completed["correlationId"], "rpc-1");
    assert_eq!(completed["result"]["content"][0]["text"], "hi\n");
    assert_eq!(completed["result"]["exitCode"], 0);

    let denied = &responses[1]["result"];
    assert_eq!(denied["status"], "error");
    assert_eq!(denied["code"], "AuthorizationError");

    let timed_out = &responses[2]["result"];
    assert_eq!(timed_out["status"], "TimedOut");
    assert_eq!(timed_out["code"], "ExecutionTimeout");
    assert!(timed_out["message"].as_str().unwrap().contains("budget"));

    let rejected = &responses[3]["result"];
    assert_eq!(rejected["status"], "error");
    assert_eq!(rejected["code"], "ValidationError");

    assert_eq!(harness.records().len(), 4);
}

#[tokio::test]
async fn test_malformed_call_is_audited() {
    let harness = GatewayHarness::new();
    let responses = session(
        &harness,
        &[json!({"jsonrpc": "2.0", "id": 9, "method": "call_tool",
                 "params": {"name": "echo", "arguments": "not an object", "principal": {"id": "bob"}}})],
    )
    .await;

    assert_eq!(responses[0]["result"]["status"], "error");
    assert_eq!(responses[0]["result"]["code"], "ValidationError");

    let records = harness.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].principal_id.as_str(), "bob");
    assert_eq!(records[0].tool_name, "echo");
}

#[tokio::test]
async fn test_envelope_errors_use_error_member() {
    let harness = GatewayHarness::new();
    let responses = session(
        &harness,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/delete"}),
            json!({"jsonrpc": "1.0", "id": 2, "method": "initialize"}),
        ],
    )
    .await;

    assert_eq!(responses[0]["error"]["data"]["code"], "MethodNotFound");
    assert!(responses[0].get("result").is_none());
    assert_eq!(responses[1]["error"]["code"], -32600);
    assert!(harness.records().is_empty());
}
