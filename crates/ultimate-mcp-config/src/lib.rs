// crates/ultimate-mcp-config/src/lib.rs
// ============================================================================
// Module: Ultimate MCP Configuration Library
// Description: Public API surface for platform configuration.
// Purpose: Expose the typed config model and its environment loader.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! Configuration is loaded once at startup from environment variables and
//! validated fail-closed: malformed values and weak secrets reject the whole
//! configuration rather than degrading to defaults.
//! Security posture: configuration is untrusted input and must be validated.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuthConfig;
pub use config::BreakerSettings;
pub use config::CacheConfig;
pub use config::ConfigError;
pub use config::Environment;
pub use config::ExecConfig;
pub use config::GraphConfig;
pub use config::LogConfig;
pub use config::LogFormat;
pub use config::PlatformConfig;
pub use config::RateLimitSettings;
pub use config::ServerConfig;
