// crates/ultimate-mcp-server/tests/common/mod.rs
// ============================================================================
// Module: Test Support
// Description: Recording graph driver and server spawn helpers.
// ============================================================================
//! ## Overview
//! Shared fixtures: a scripted in-memory graph driver, a config loader that
//! never touches the process environment, and a helper that serves the app
//! on an ephemeral port.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    dead_code,
    reason = "Test-only helpers and assertions."
)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use ultimate_mcp_config::PlatformConfig;
use ultimate_mcp_core::RevocationStore;
use ultimate_mcp_core::Role;
use ultimate_mcp_core::TokenService;
use ultimate_mcp_core::UserId;
use ultimate_mcp_graph::DriverError;
use ultimate_mcp_graph::GraphDriver;
use ultimate_mcp_graph::Row;
use ultimate_mcp_graph::Statement;
use ultimate_mcp_server::PlatformServer;

/// Signing secret shared by the server under test and issued tokens.
pub const TEST_SIGNING_KEY: &str = "test-signing-key-for-integration-suites";

/// One recorded write statement.
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    /// Query text.
    pub query: String,
    /// Bound parameters.
    pub params: Value,
    /// Position of the containing batch, or `None` for single writes.
    pub batch: Option<usize>,
}

/// Graph driver that records writes and replays scripted reads.
#[derive(Default)]
pub struct RecordingDriver {
    /// Writes in arrival order.
    pub writes: Mutex<Vec<RecordedWrite>>,
    /// Batches observed so far.
    pub batches: Mutex<usize>,
    /// Scripted responses consumed by reads in order; empty means no rows.
    pub scripted_reads: Mutex<Vec<Vec<Row>>>,
    /// Read queries observed.
    pub read_queries: Mutex<Vec<String>>,
}

impl RecordingDriver {
    /// Queues one scripted read result.
    pub fn script_read(&self, rows: Vec<Row>) {
        self.scripted_reads.lock().unwrap().push(rows);
    }

    /// Returns recorded writes.
    pub fn recorded(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphDriver for RecordingDriver {
    async fn read(&self, query: &str, _params: &Value) -> Result<Vec<Row>, DriverError> {
        self.read_queries.lock().unwrap().push(query.to_string());
        let mut scripted = self.scripted_reads.lock().unwrap();
        if scripted.is_empty() { Ok(Vec::new()) } else { Ok(scripted.remove(0)) }
    }

    async fn write(&self, query: &str, params: &Value) -> Result<(), DriverError> {
        self.writes.lock().unwrap().push(RecordedWrite {
            query: query.to_string(),
            params: params.clone(),
            batch: None,
        });
        Ok(())
    }

    async fn write_batch(&self, statements: &[Statement]) -> Result<(), DriverError> {
        let mut batches = self.batches.lock().unwrap();
        let batch_index = *batches;
        *batches += 1;
        let mut writes = self.writes.lock().unwrap();
        for statement in statements {
            writes.push(RecordedWrite {
                query: statement.query.clone(),
                params: statement.params.clone(),
                batch: Some(batch_index),
            });
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Loads a test configuration with overrides, never reading the process
/// environment.
pub fn test_config(overrides: &[(&str, &str)]) -> PlatformConfig {
    let mut map: HashMap<String, String> = [
        ("ENV", "development"),
        ("AUTH_SIGNING_KEY", TEST_SIGNING_KEY),
        ("RATE_LIMIT_PER_MINUTE", "10000"),
        ("RATE_LIMIT_PER_HOUR", "100000"),
        ("RATE_LIMIT_PER_DAY", "1000000"),
        ("RATE_LIMIT_BURST", "10000"),
    ]
    .iter()
    .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
    .collect();
    for (key, value) in overrides {
        map.insert((*key).to_string(), (*value).to_string());
    }
    PlatformConfig::from_lookup(|key| map.get(key).cloned()).expect("test config")
}

/// Serves the app on an ephemeral port and returns its address.
pub async fn spawn_server(
    config: PlatformConfig,
    driver: Arc<RecordingDriver>,
) -> SocketAddr {
    let server = PlatformServer::from_config_with_driver(config, driver).expect("server");
    let app = server.app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    addr
}

/// Issues a token signed with the test key.
pub fn issue_token(user: &str, roles: &[Role]) -> String {
    let tokens = TokenService::from_secret(TEST_SIGNING_KEY, 24, Arc::new(RevocationStore::new()))
        .expect("token service");
    tokens.issue(&UserId::new(user), roles, None).expect("token")
}
