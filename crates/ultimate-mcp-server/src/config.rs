// crates/ultimate-mcp-server/src/config.rs
// ============================================================================
// Module: Server Configuration (Re-export)
// Description: Re-export canonical platform config types.
// Purpose: Preserve the server public API while centralizing config logic.
// Dependencies: ultimate-mcp-config
// ============================================================================

//! ## Overview
//! This module re-exports the canonical configuration model from
//! `ultimate-mcp-config` to keep server callers stable while enforcing a
//! single source of truth.

/// Re-export canonical config types and helpers.
pub use ultimate_mcp_config::*;
