// crates/ultimate-mcp-graph/src/driver.rs
// ============================================================================
// Module: Graph Driver Contract
// Description: Async driver trait and error classes for the graph database.
// Purpose: Define the seam between the platform and the concrete database.
// Dependencies: async-trait, serde_json
// ============================================================================

//! ## Overview
//! The platform never talks to the database directly; it talks to this trait.
//! Statements are always parameterized: query text and parameter values
//! travel separately and are never interpolated. Error classes matter more
//! than messages: only [`DriverError::Transient`] is retryable, and the
//! client's retry and breaker logic keys off that distinction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One result row keyed by return alias.
pub type Row = Map<String, Value>;

/// A parameterized statement.
#[derive(Debug, Clone)]
pub struct Statement {
    /// Query text with `$param` placeholders.
    pub query: String,
    /// Bound parameter values.
    pub params: Value,
}

impl Statement {
    /// Creates a statement with bound parameters.
    #[must_use]
    pub fn new(query: impl Into<String>, params: Value) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Driver failure classes.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Transient fault (service unavailable, session expired). Retryable.
    #[error("transient graph error: {0}")]
    Transient(String),
    /// Authentication or authorization failure at the database.
    #[error("graph auth error: {0}")]
    Unauthorized(String),
    /// Statement rejected by the query parser.
    #[error("graph syntax error: {0}")]
    Syntax(String),
    /// Uniqueness or schema constraint violated.
    #[error("graph constraint violation: {0}")]
    ConstraintViolation(String),
    /// Malformed response or other protocol fault.
    #[error("graph protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Returns true for errors worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Async driver contract for a graph database.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Runs a read statement and returns its rows.
    async fn read(&self, query: &str, params: &Value) -> Result<Vec<Row>, DriverError>;

    /// Runs a single write statement.
    async fn write(&self, query: &str, params: &Value) -> Result<(), DriverError>;

    /// Runs several statements in one atomic transaction, preserving order.
    async fn write_batch(&self, statements: &[Statement]) -> Result<(), DriverError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), DriverError>;
}
