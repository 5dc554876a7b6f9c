// crates/ultimate-mcp-core/src/validation/mod.rs
// ============================================================================
// Module: Validation Subsystem
// Description: AST code validation, graph-query gating, identifier checks.
// Purpose: Reject dangerous or malformed input before any tool logic runs.
// Dependencies: crate::validation::{code, idents, query}
// ============================================================================

//! ## Overview
//! All validators fail with [`InvalidInput`] carrying a reason and, when
//! known, the offending token. Nothing downstream of a validator ever sees a
//! rejected payload; there is no partial execution.

pub mod code;
pub mod idents;
pub mod query;

use thiserror::Error;

/// Validation rejection surfaced to clients as HTTP 400 / MCP invalid params.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct InvalidInput {
    /// Human-readable rejection reason.
    pub reason: String,
    /// The token that triggered the rejection, when known.
    pub offending_token: Option<String>,
}

impl InvalidInput {
    /// Creates a rejection without an offending token.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            offending_token: None,
        }
    }

    /// Creates a rejection pointing at a specific token.
    #[must_use]
    pub fn with_token(reason: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            offending_token: Some(token.into()),
        }
    }
}
