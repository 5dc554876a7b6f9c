// crates/ultimate-mcp-core/src/core/mod.rs
// ============================================================================
// Module: Core Domain Model
// Description: Identifiers, hashing, timestamps, and persisted artifact types.
// Purpose: Provide the shared vocabulary for tools, storage, and audit.
// Dependencies: crate::core::{artifacts, hashing, identifiers, time}
// ============================================================================

//! ## Overview
//! The core domain model groups the types every other subsystem speaks:
//! opaque identifiers, content hashing, wall-clock timestamps, and the
//! persisted artifact records produced by tool runs.

pub mod artifacts;
pub mod hashing;
pub mod identifiers;
pub mod time;

pub use artifacts::AuditEvent;
pub use artifacts::AuditEventType;
pub use artifacts::AuditSeverity;
pub use artifacts::ExecutionArtifact;
pub use artifacts::GenerationArtifact;
pub use artifacts::LintArtifact;
pub use artifacts::TestArtifact;
pub use hashing::CodeHash;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::hash_bytes_hex;
pub use hashing::hash_canonical_json_hex;
pub use identifiers::ArtifactId;
pub use identifiers::ToolName;
pub use identifiers::UserId;
pub use time::epoch_millis;
pub use time::epoch_secs;
