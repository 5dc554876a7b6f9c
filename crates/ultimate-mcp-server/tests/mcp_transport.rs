// crates/ultimate-mcp-server/tests/mcp_transport.rs
// ============================================================================
// Module: MCP Transport Tests
// Description: End-to-end tests for the MCP streaming-HTTP endpoint.
// ============================================================================
//! ## Overview
//! Exercises the JSON-RPC surface: the SSE accept requirement, tool listing,
//! shared pipeline gates, and tool calls through the same registry the HTTP
//! routes use.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use ultimate_mcp_core::Role;

use common::RecordingDriver;
use common::issue_token;
use common::spawn_server;
use common::test_config;

/// Posts one JSON-RPC request with the SSE accept header and decodes the
/// single event payload.
async fn rpc(addr: std::net::SocketAddr, body: Value, token: Option<&str>) -> Value {
    let client = reqwest::Client::new();
    let mut request = client
        .post(format!("http://{addr}/mcp"))
        .header("accept", "application/json, text/event-stream")
        .json(&body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await.unwrap();
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    let data_line = text
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("sse data line");
    serde_json::from_str(data_line).unwrap()
}

#[tokio::test]
async fn clients_without_sse_accept_get_a_protocol_error() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/mcp"))
        .header("accept", "application/json")
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 406);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!(-32600));
}

#[tokio::test]
async fn tools_list_advertises_the_shared_registry() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let reply = rpc(
        addr,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
        None,
    )
    .await;
    let tools = reply["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> =
        tools.iter().map(|tool| tool["name"].as_str().unwrap()).collect();
    for expected in [
        "lint_code",
        "execute_code",
        "run_tests",
        "generate_code",
        "graph_upsert",
        "graph_query",
        "list_prompts",
        "get_prompt",
    ] {
        assert!(names.contains(&expected), "{expected}");
    }
    assert!(tools.iter().all(|tool| tool["input_schema"].is_object()));
}

#[tokio::test]
async fn initialize_reports_server_info() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let reply = rpc(
        addr,
        json!({ "jsonrpc": "2.0", "id": 7, "method": "initialize", "params": {} }),
        None,
    )
    .await;
    assert_eq!(reply["id"], json!(7));
    assert_eq!(reply["result"]["serverInfo"]["name"], "ultimate-mcp");
    assert!(reply["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn tool_calls_pass_the_same_gates_as_http() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    // Unauthenticated execution is rejected with the canonical code.
    let denied = rpc(
        addr,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": { "name": "execute_code", "arguments": { "code": "print(1)" } },
        }),
        None,
    )
    .await;
    assert_eq!(denied["error"]["code"], json!(-32001));

    // A viewer may lint through MCP just like over HTTP.
    let token = issue_token("viewer-1", &[Role::Viewer]);
    let linted = rpc(
        addr,
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {
                "name": "lint_code",
                "arguments": { "code": "def add(a, b):\n    return a + b\n" },
            },
        }),
        Some(&token),
    )
    .await;
    let content = &linted["result"]["content"][0];
    assert_eq!(content["type"], "json");
    assert_eq!(content["json"]["functions"], json!(["add"]));
}

#[tokio::test]
async fn unknown_methods_and_tools_are_rejected() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let method = rpc(
        addr,
        json!({ "jsonrpc": "2.0", "id": 4, "method": "resources/list" }),
        None,
    )
    .await;
    assert_eq!(method["error"]["code"], json!(-32601));

    let tool = rpc(
        addr,
        json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "tools/call",
            "params": { "name": "rm_rf", "arguments": {} },
        }),
        None,
    )
    .await;
    assert_eq!(tool["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn prompts_are_served_over_mcp() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let listed = rpc(
        addr,
        json!({ "jsonrpc": "2.0", "id": 6, "method": "prompts/list" }),
        None,
    )
    .await;
    assert!(
        listed["result"]["prompts"]
            .as_array()
            .unwrap()
            .iter()
            .any(|record| record["id"] == "proceed")
    );

    let missing = rpc(
        addr,
        json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "prompts/get",
            "params": { "id": "nope" },
        }),
        None,
    )
    .await;
    assert_eq!(missing["error"]["code"], json!(-32004));
}

#[tokio::test]
async fn invalid_jsonrpc_versions_are_rejected() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let reply = rpc(
        addr,
        json!({ "jsonrpc": "1.0", "id": 9, "method": "tools/list" }),
        None,
    )
    .await;
    assert_eq!(reply["error"]["code"], json!(-32600));
}
