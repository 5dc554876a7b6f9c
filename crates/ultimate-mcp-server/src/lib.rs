// crates/ultimate-mcp-server/src/lib.rs
// ============================================================================
// Module: Ultimate MCP Server Library
// Description: Tool registry, pipeline, execution engine, and transports.
// Purpose: Expose the platform's five tools over HTTP/JSON and MCP.
// Dependencies: ultimate-mcp-{config, core, graph}, axum, tokio
// ============================================================================

//! ## Overview
//! The server crate wires the core subsystems into one request pipeline and
//! exposes the tool registry over two co-equal transports: JSON-over-HTTP
//! routes and an MCP streaming-HTTP endpoint. Both share the same registry,
//! schemas, and handlers; there is deliberately no second validator.
//! Security posture: every transport input is untrusted and passes the full
//! pipeline (correlation → limits → auth → authz → rate limit → validation)
//! before any tool logic runs.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod config;
pub mod correlation;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod telemetry;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditLog;
pub use auth::Identity;
pub use auth::RequestContext;
pub use auth::parse_bearer_token;
pub use correlation::CorrelationIdGenerator;
pub use correlation::sanitize_request_id;
pub use exec::ExecEngine;
pub use exec::ExecError;
pub use logging::LogSink;
pub use logging::Logger;
pub use logging::NoopLogSink;
pub use logging::StderrLogSink;
pub use pipeline::GateError;
pub use pipeline::RequestPipeline;
pub use prompts::PromptCatalog;
pub use prompts::PromptRecord;
pub use server::PlatformServer;
pub use server::ServerError;
pub use telemetry::MetricsRegistry;
pub use telemetry::REQUEST_LATENCY_BUCKETS_MS;
pub use tools::ToolDefinition;
pub use tools::ToolError;
pub use tools::ToolRouter;
