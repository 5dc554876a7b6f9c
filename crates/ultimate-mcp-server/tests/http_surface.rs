// crates/ultimate-mcp-server/tests/http_surface.rs
// ============================================================================
// Module: HTTP Surface Tests
// Description: End-to-end tests for the JSON-over-HTTP routes.
// ============================================================================
//! ## Overview
//! Drives the served app over real HTTP with a recording graph driver:
//! pipeline ordering, correlation ids, tool behavior, and the error envelope.

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

// ============================================================================
// SECTION: Service Routes
// ============================================================================

#[tokio::test]
async fn health_reports_service_and_database() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let response =
        reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["service"], "ok");
    assert_eq!(body["database"], json!(true));
}

#[tokio::test]
async fn metrics_exposes_counters_and_breakers() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["requests"]["requests_total"].is_u64());
    assert_eq!(body["graph"]["read_breaker"]["state"], "closed");
    assert_eq!(body["graph"]["write_breaker"]["state"], "closed");
}

#[tokio::test]
async fn prompt_endpoints_serve_the_catalog() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let list: Value =
        reqwest::get(format!("http://{addr}/prompts")).await.unwrap().json().await.unwrap();
    assert!(list["prompts"].as_array().unwrap().iter().any(|record| record["id"] == "proceed"));

    let one = reqwest::get(format!("http://{addr}/prompts/proceed")).await.unwrap();
    assert_eq!(one.status(), 200);

    let missing = reqwest::get(format!("http://{addr}/prompts/unknown")).await.unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
    assert!(body["request_id"].is_string());
}

// ============================================================================
// SECTION: Correlation and Headers
// ============================================================================

#[tokio::test]
async fn request_id_round_trips_and_headers_are_stamped() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/health"))
        .header("x-request-id", "client-supplied-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "client-supplied-1");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers().contains_key("x-response-time"));

    // An invalid client id is replaced with a server-issued one.
    let replaced = client
        .get(format!("http://{addr}/health"))
        .header("x-request-id", "has spaces")
        .send()
        .await
        .unwrap();
    let issued = replaced.headers()["x-request-id"].to_str().unwrap();
    assert!(issued.starts_with("umcp-"));
}

#[tokio::test]
async fn declared_oversized_bodies_are_rejected() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[("MAX_BODY_BYTES", "2048")]), driver).await;
    let client = reqwest::Client::new();
    let oversized = "x".repeat(4096);
    let response = client
        .post(format!("http://{addr}/lint_code"))
        .json(&json!({ "code": oversized }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "too_large");
}

// ============================================================================
// SECTION: Lint
// ============================================================================

#[tokio::test]
async fn lint_baseline_extracts_facts_and_persists() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), Arc::clone(&driver)).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/lint_code"))
        .json(&json!({
            "code": "def add(a, b):\n    return a + b\n",
            "language": "python",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["functions"], json!(["add"]));
    assert_eq!(body["classes"], json!([]));
    assert_eq!(body["imports"], json!([]));
    assert_eq!(body["complexity"], json!(1));
    assert_eq!(body["analyzer_exit_code"], json!(0));
    assert!(body["code_hash"].as_str().unwrap().len() == 64);

    let writes = driver.recorded();
    assert!(writes.iter().any(|write| write.query.contains("LintResult")));
}

#[tokio::test]
async fn lint_syntax_errors_are_findings_not_failures() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/lint_code"))
        .json(&json!({ "code": "def broken(:\n" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["complexity"], json!(0));
    assert_eq!(body["analyzer_exit_code"], json!(1));
    assert!(body["analyzer_output"].as_str().unwrap().contains("syntax"));
}

// ============================================================================
// SECTION: Auth Gates
// ============================================================================

#[tokio::test]
async fn execute_requires_a_bearer_token() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/execute_code"))
        .json(&json!({ "code": "print(6*7)" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthenticated");
}

#[tokio::test]
async fn viewer_tokens_cannot_execute() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let token = issue_token("viewer-1", &[Role::Viewer]);
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/execute_code"))
        .bearer_auth(token)
        .json(&json!({ "code": "print(6*7)" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "permission_denied");
    assert_eq!(body["error"]["details"]["permission"], "tools:execute");
}

#[tokio::test]
async fn garbage_tokens_are_rejected_even_on_public_routes() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/lint_code"))
        .bearer_auth("not-a-real-token")
        .json(&json!({ "code": "x = 1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn dangerous_code_is_blocked_before_spawning() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), Arc::clone(&driver)).await;
    let token = issue_token("dev-1", &[Role::Developer]);
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/execute_code"))
        .bearer_auth(token)
        .json(&json!({ "code": "__import__('os').system('id')" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_input");
    // No execution artifact was persisted.
    assert!(!driver.recorded().iter().any(|write| write.query.contains("ExecutionResult")));
}

// ============================================================================
// SECTION: Rate Limiting
// ============================================================================

#[tokio::test]
async fn burst_limit_rejects_with_retry_after() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[("RATE_LIMIT_BURST", "2")]), driver).await;
    let client = reqwest::Client::new();
    let lint_url = format!("http://{addr}/lint_code");
    let payload = json!({ "code": "x = 1" });
    let first = client.post(&lint_url).json(&payload).send().await.unwrap();
    assert_eq!(first.status(), 200);
    let second = client.post(&lint_url).json(&payload).send().await.unwrap();
    assert_eq!(second.status(), 200);
    let third = client.post(&lint_url).json(&payload).send().await.unwrap();
    assert_eq!(third.status(), 429);
    assert!(third.headers().contains_key("retry-after"));
    let body: Value = third.json().await.unwrap();
    assert_eq!(body["error"]["code"], "rate_limited");
}

// ============================================================================
// SECTION: Graph Tools
// ============================================================================

#[tokio::test]
async fn graph_upsert_orders_nodes_before_relationships() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), Arc::clone(&driver)).await;
    let token = issue_token("admin-1", &[Role::Admin]);
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/graph_upsert"))
        .bearer_auth(token)
        .json(&json!({
            "nodes": [
                { "key": "A", "labels": ["Svc"], "properties": { "name": "front" } },
                { "key": "B", "labels": ["Svc"], "properties": { "name": "back" } },
            ],
            "relationships": [
                { "start": "A", "end": "B", "type": "CALLS", "properties": { "latency_ms": 120 } },
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["nodes"], json!(2));
    assert_eq!(body["relationships"], json!(1));

    let writes: Vec<_> = driver
        .recorded()
        .into_iter()
        .filter(|write| write.batch == Some(0))
        .collect();
    assert_eq!(writes.len(), 3);
    assert!(writes[0].query.contains("MERGE (n:GraphNode"));
    assert!(writes[1].query.contains("MERGE (n:GraphNode"));
    assert!(writes[2].query.contains("MERGE (a)-[r:`CALLS`]"));
    assert_eq!(writes[2].params["start"], json!("A"));
}

#[tokio::test]
async fn upsert_rejects_bad_identifiers() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), Arc::clone(&driver)).await;
    let token = issue_token("admin-1", &[Role::Admin]);
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/graph_upsert"))
        .bearer_auth(token)
        .json(&json!({
            "nodes": [{ "key": "bad key!", "labels": [], "properties": {} }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert!(driver.recorded().is_empty());
}

#[tokio::test]
async fn developer_tokens_cannot_upsert() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let token = issue_token("dev-1", &[Role::Developer]);
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/graph_upsert"))
        .bearer_auth(token)
        .json(&json!({ "nodes": [{ "key": "A" }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn graph_query_returns_scripted_rows() {
    let driver = Arc::new(RecordingDriver::default());
    driver.script_read(vec![row(&[
        ("a", json!("front")),
        ("b", json!("back")),
        ("l", json!(120)),
    ])]);
    let addr = spawn_server(test_config(&[]), driver).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/graph_query"))
        .json(&json!({
            "cypher": "MATCH (a:Svc)-[r:CALLS]->(b:Svc) RETURN a.name AS a, b.name AS b, \
                       r.latency_ms AS l",
            "parameters": {},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["row_count"], json!(1));
    assert_eq!(body["rows"][0]["a"], json!("front"));
    assert_eq!(body["rows"][0]["l"], json!(120));
}

#[tokio::test]
async fn mutating_queries_are_rejected_without_touching_the_driver() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), Arc::clone(&driver)).await;
    let client = reqwest::Client::new();
    for cypher in [
        "MATCH (n) DETACH DELETE n",
        "MATCH (n) ＤＥＴＡＣＨ ＤＥＬＥＴＥ n",
        "CREATE (n:Pwn)",
        "MATCH (n) RETURN n; MATCH (m) RETURN m",
    ] {
        let response = client
            .post(format!("http://{addr}/graph_query"))
            .json(&json!({ "cypher": cypher }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "{cypher}");
    }
    assert!(driver.read_queries.lock().unwrap().is_empty());
}

// ============================================================================
// SECTION: Generation
// ============================================================================

#[tokio::test]
async fn generation_renders_scalars_only() {
    let driver = Arc::new(RecordingDriver::default());
    let addr = spawn_server(test_config(&[]), driver).await;
    let token = issue_token("dev-1", &[Role::Developer]);
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/generate_code"))
        .bearer_auth(&token)
        .json(&json!({
            "template": "def {{name}}():\n    return {{value}}\n",
            "context": { "name": "answer", "value": 42 },
            "language": "python",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["output"], json!("def answer():\n    return 42\n"));

    let nested = client
        .post(format!("http://{addr}/generate_code"))
        .bearer_auth(&token)
        .json(&json!({
            "template": "{{conf}}",
            "context": { "conf": { "nested": true } },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(nested.status(), 400);
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn row(pairs: &[(&str, Value)]) -> ultimate_mcp_graph::Row {
    pairs.iter().map(|(key, value)| ((*key).to_string(), value.clone())).collect()
}
