// crates/ultimate-mcp-graph/src/schema.rs
// ============================================================================
// Module: Schema Bootstrap
// Description: Uniqueness constraints and indexes applied at startup.
// Purpose: Guarantee the shapes the platform's queries and audits rely on.
// Dependencies: crate::client
// ============================================================================

//! ## Overview
//! The bootstrap statements are idempotent (`IF NOT EXISTS`) and applied
//! before the server accepts traffic. Failure to apply them is a fatal
//! startup condition, not a degraded mode.

use serde_json::json;

use crate::client::GraphClient;
use crate::client::GraphError;

/// Idempotent constraint and index statements, applied in order.
const BOOTSTRAP_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT audit_event_id IF NOT EXISTS FOR (n:AuditEvent) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT blacklisted_token_hash IF NOT EXISTS FOR (n:BlacklistedToken) REQUIRE \
     n.token_hash IS UNIQUE",
    "CREATE CONSTRAINT user_user_id IF NOT EXISTS FOR (n:User) REQUIRE n.user_id IS UNIQUE",
    "CREATE CONSTRAINT lint_result_id IF NOT EXISTS FOR (n:LintResult) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT execution_result_id IF NOT EXISTS FOR (n:ExecutionResult) REQUIRE n.id \
     IS UNIQUE",
    "CREATE CONSTRAINT test_result_id IF NOT EXISTS FOR (n:TestResult) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT generation_result_id IF NOT EXISTS FOR (n:GenerationResult) REQUIRE n.id \
     IS UNIQUE",
    "CREATE INDEX execution_result_code_hash IF NOT EXISTS FOR (n:ExecutionResult) ON \
     (n.code_hash)",
    "CREATE INDEX execution_result_timestamp IF NOT EXISTS FOR (n:ExecutionResult) ON \
     (n.created_at)",
    "CREATE INDEX lint_result_code_hash IF NOT EXISTS FOR (n:LintResult) ON (n.code_hash)",
    "CREATE INDEX audit_event_type_time IF NOT EXISTS FOR (n:AuditEvent) ON (n.event_type, \
     n.timestamp)",
    "CREATE INDEX audit_event_user IF NOT EXISTS FOR (n:AuditEvent) ON (n.user_id)",
    "CREATE INDEX blacklisted_token_expiry IF NOT EXISTS FOR (n:BlacklistedToken) ON \
     (n.expires_at)",
];

/// Applies every bootstrap statement through the write path.
///
/// # Errors
///
/// Returns the first [`GraphError`]; callers treat this as fatal at startup.
pub async fn bootstrap_schema(client: &GraphClient) -> Result<(), GraphError> {
    for statement in BOOTSTRAP_STATEMENTS {
        client.execute_write(statement, &json!({}), &[]).await?;
    }
    Ok(())
}
