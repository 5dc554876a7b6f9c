// crates/ultimate-mcp-server/src/audit.rs
// ============================================================================
// Module: Audit Log
// Description: Append-only audit events persisted through the graph client.
// Purpose: Record every security-relevant decision durably and observably.
// Dependencies: tokio, ultimate-mcp-core, ultimate-mcp-graph
// ============================================================================

//! ## Overview
//! Audit events are built fully in the request path, then persisted off the
//! hot path: recording spawns a task that writes an `AuditEvent` node through
//! the graph client and mirrors the event to the structured log. Persistence
//! failures are logged and never surfaced to the client; an audit outage
//! must not turn into a request outage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use ultimate_mcp_core::ArtifactId;
use ultimate_mcp_core::AuditEvent;
use ultimate_mcp_core::AuditEventType;
use ultimate_mcp_core::AuditSeverity;
use ultimate_mcp_core::UserId;
use ultimate_mcp_core::epoch_millis;
use ultimate_mcp_graph::GraphClient;

use crate::logging::LogLevel;
use crate::logging::Logger;

// ============================================================================
// SECTION: Audit Log
// ============================================================================

/// Append-only audit pipeline over the graph client.
#[derive(Clone)]
pub struct AuditLog {
    /// Persistence path.
    graph: Arc<GraphClient>,
    /// Structured log mirror.
    logger: Logger,
}

impl AuditLog {
    /// Creates an audit log over the given graph client.
    #[must_use]
    pub fn new(graph: Arc<GraphClient>, logger: Logger) -> Self {
        Self {
            graph,
            logger,
        }
    }

    /// Builds an event with a fresh id and the current time.
    #[must_use]
    pub fn event(
        event_type: AuditEventType,
        severity: AuditSeverity,
        correlation_id: &str,
        user_id: Option<&UserId>,
        attributes: Map<String, Value>,
    ) -> AuditEvent {
        AuditEvent {
            id: new_event_id(),
            event_type,
            timestamp: epoch_millis(),
            user_id: user_id.cloned(),
            correlation_id: correlation_id.to_string(),
            severity,
            attributes,
        }
    }

    /// Records an event: persists off the hot path and mirrors to the log.
    pub fn record(&self, event: AuditEvent) {
        let level = match event.severity {
            AuditSeverity::Info => LogLevel::Info,
            AuditSeverity::Warning => LogLevel::Warn,
            AuditSeverity::Error => LogLevel::Error,
        };
        let mut fields = Map::new();
        fields.insert("audit_type".to_string(), json!(event.event_type.as_str()));
        if let Some(user_id) = &event.user_id {
            fields.insert("user_id".to_string(), json!(user_id.as_str()));
        }
        self.logger.log(level, "audit.event", Some(&event.correlation_id), fields);

        let graph = Arc::clone(&self.graph);
        let logger = self.logger.clone();
        tokio::spawn(async move {
            let attributes =
                serde_json::to_string(&event.attributes).unwrap_or_else(|_| "{}".to_string());
            let params = json!({
                "id": event.id.as_str(),
                "event_type": event.event_type.as_str(),
                "timestamp": event.timestamp,
                "user_id": event.user_id.as_ref().map(|user| user.as_str()),
                "correlation_id": event.correlation_id,
                "severity": severity_label(event.severity),
                "attributes": attributes,
            });
            let statement = "CREATE (e:AuditEvent {id: $id, event_type: $event_type, timestamp: \
                             $timestamp, user_id: $user_id, correlation_id: $correlation_id, \
                             severity: $severity, attributes: $attributes})";
            if let Err(err) = graph.execute_write(statement, &params, &["AuditEvent"]).await {
                logger.error(
                    format!("audit persistence failed: {err}"),
                    Some(&event.correlation_id),
                );
            }
        });
    }
}

/// Returns the stable severity label.
const fn severity_label(severity: AuditSeverity) -> &'static str {
    match severity {
        AuditSeverity::Info => "info",
        AuditSeverity::Warning => "warning",
        AuditSeverity::Error => "error",
    }
}

/// Issues a unique audit event id.
fn new_event_id() -> ArtifactId {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let mut hex = String::with_capacity(35);
    hex.push_str("ae-");
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
    }
    ArtifactId::new(hex)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
