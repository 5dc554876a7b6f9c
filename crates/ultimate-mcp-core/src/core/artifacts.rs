// crates/ultimate-mcp-core/src/core/artifacts.rs
// ============================================================================
// Module: Persisted Artifacts
// Description: Tool result records and audit events persisted to the graph.
// Purpose: Define the durable shapes produced by every tool invocation.
// Dependencies: serde, crate::core::{hashing, identifiers}
// ============================================================================

//! ## Overview
//! Every tool run produces a durable artifact; every security-relevant
//! decision produces an audit event. Artifacts are immutable once persisted:
//! callers build them fully before handing them to the storage layer. Output
//! fields are already truncated to the configured cap when the artifact is
//! constructed; the `truncated` flag records whether truncation occurred.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::hashing::CodeHash;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: Tool Artifacts
// ============================================================================

/// Persisted result of a lint run.
///
/// # Invariants
/// - `(code_hash, analyzer_version)` is the idempotency key.
/// - Name lists are source-ordered and deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintArtifact {
    /// Artifact identifier.
    pub id: ArtifactId,
    /// SHA-256 of the input source.
    pub code_hash: CodeHash,
    /// Source language.
    pub language: String,
    /// Function names in source order.
    pub functions: Vec<String>,
    /// Class names in source order.
    pub classes: Vec<String>,
    /// Imported module names in source order.
    pub imports: Vec<String>,
    /// Cyclomatic complexity approximation (branch nodes + 1).
    pub complexity: u32,
    /// External analyzer exit code (0 when the analyzer is absent).
    pub analyzer_exit_code: i32,
    /// Bounded external analyzer output.
    pub analyzer_output: String,
    /// Analyzer version label used in the idempotency key.
    pub analyzer_version: String,
    /// Creation time (unix millis).
    pub created_at: u64,
}

/// Persisted result of a code execution.
///
/// # Invariants
/// - `stdout` and `stderr` are at most the configured output cap.
/// - `return_code` is `-1` for timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionArtifact {
    /// Artifact identifier.
    pub id: ArtifactId,
    /// SHA-256 of the executed source.
    pub code_hash: CodeHash,
    /// Source language.
    pub language: String,
    /// Child exit code, or -1 on timeout.
    pub return_code: i32,
    /// Captured standard output, truncated to the cap.
    pub stdout: String,
    /// Captured standard error, truncated to the cap.
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Peak resident set size in bytes where the OS reports it, else 0.
    pub peak_memory_bytes: u64,
    /// True when either output stream exceeded the cap.
    pub truncated: bool,
    /// True when the run was satisfied from the execution cache.
    pub cache_hit: bool,
    /// Creation time (unix millis).
    pub created_at: u64,
}

/// Persisted result of a test harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestArtifact {
    /// Artifact identifier.
    pub id: ArtifactId,
    /// Test framework label.
    pub framework: String,
    /// Harness exit code, or -1 on timeout.
    pub return_code: i32,
    /// Captured standard output, truncated to the cap.
    pub stdout: String,
    /// Captured standard error, truncated to the cap.
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// True when either output stream exceeded the cap.
    pub truncated: bool,
    /// Parsed pass count when the harness summary was readable.
    pub passed: Option<u32>,
    /// Parsed failure count when the harness summary was readable.
    pub failed: Option<u32>,
    /// Creation time (unix millis).
    pub created_at: u64,
}

/// Persisted result of a template render. The render context is discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationArtifact {
    /// Artifact identifier.
    pub id: ArtifactId,
    /// Target language label.
    pub language: String,
    /// Rendered output text.
    pub output: String,
    /// Creation time (unix millis).
    pub created_at: u64,
}

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Audit event classification.
///
/// # Invariants
/// - Variants are stable; persisted labels never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Successful authentication.
    AuthSuccess,
    /// Failed authentication.
    AuthFailure,
    /// Authorization granted.
    AuthzGranted,
    /// Authorization denied.
    AuthzDenied,
    /// Code execution performed.
    CodeExec,
    /// Graph write performed.
    GraphWrite,
    /// Graph read performed.
    GraphRead,
    /// Input rejected by a security validator.
    SecurityViolation,
    /// Request rejected by the rate limiter.
    RateLimited,
}

impl AuditEventType {
    /// Returns the stable persisted label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthSuccess => "auth_success",
            Self::AuthFailure => "auth_failure",
            Self::AuthzGranted => "authz_granted",
            Self::AuthzDenied => "authz_denied",
            Self::CodeExec => "code_exec",
            Self::GraphWrite => "graph_write",
            Self::GraphRead => "graph_read",
            Self::SecurityViolation => "security_violation",
            Self::RateLimited => "rate_limited",
        }
    }
}

/// Audit event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Routine operational event.
    Info,
    /// Suspicious or rejected activity.
    Warning,
    /// Confirmed policy violation or internal fault.
    Error,
}

/// Append-only audit record. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub id: ArtifactId,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Event time (unix millis).
    pub timestamp: u64,
    /// Acting user when authenticated.
    pub user_id: Option<UserId>,
    /// Correlation identifier of the originating request.
    pub correlation_id: String,
    /// Event severity.
    pub severity: AuditSeverity,
    /// Flat attribute map; values are JSON scalars.
    pub attributes: Map<String, Value>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::AuditEventType;

    #[test]
    fn audit_type_labels_are_stable() {
        let labels: Vec<&str> = [
            AuditEventType::AuthSuccess,
            AuditEventType::AuthFailure,
            AuditEventType::AuthzGranted,
            AuditEventType::AuthzDenied,
            AuditEventType::CodeExec,
            AuditEventType::GraphWrite,
            AuditEventType::GraphRead,
            AuditEventType::SecurityViolation,
            AuditEventType::RateLimited,
        ]
        .iter()
        .map(|event_type| event_type.as_str())
        .collect();
        assert_eq!(
            labels,
            vec![
                "auth_success",
                "auth_failure",
                "authz_granted",
                "authz_denied",
                "code_exec",
                "graph_write",
                "graph_read",
                "security_violation",
                "rate_limited",
            ]
        );
    }

    #[test]
    fn audit_type_serializes_snake_case() {
        let encoded = serde_json::to_string(&AuditEventType::SecurityViolation).unwrap();
        assert_eq!(encoded, "\"security_violation\"");
    }
}
