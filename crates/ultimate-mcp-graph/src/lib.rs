// crates/ultimate-mcp-graph/src/lib.rs
// ============================================================================
// Module: Ultimate MCP Graph Library
// Description: Public API surface for the graph persistence layer.
// Purpose: Expose the driver contract, HTTP driver, and pooled client.
// Dependencies: crate::{client, driver, http_driver, schema}
// ============================================================================

//! ## Overview
//! Persistence flows through [`client::GraphClient`], which wraps any
//! [`driver::GraphDriver`] with connection-slot pooling, retry with backoff,
//! circuit breaking, and a read-through cache with label-versioned keys. The
//! driver trait is the seam to the concrete database; the bundled HTTP driver
//! speaks the transactional-commit endpoint.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;
pub mod driver;
pub mod http_driver;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use client::GraphClient;
pub use client::GraphClientConfig;
pub use client::GraphError;
pub use client::GraphMetrics;
pub use client::RetryPolicy;
pub use driver::DriverError;
pub use driver::GraphDriver;
pub use driver::Row;
pub use driver::Statement;
pub use http_driver::HttpGraphDriver;
pub use http_driver::HttpGraphDriverConfig;
pub use schema::bootstrap_schema;
