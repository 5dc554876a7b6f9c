// crates/ultimate-mcp-server/src/auth.rs
// ============================================================================
// Module: Request Authentication
// Description: Request context and bearer-credential extraction.
// Purpose: Give the pipeline a typed, fail-closed view of the caller.
// Dependencies: ultimate-mcp-core
// ============================================================================

//! ## Overview
//! The request context carries everything auth decisions need: peer address,
//! raw authorization header, and the correlation id. Bearer parsing is strict
//! (scheme, size cap, non-empty credential); verification itself lives in the
//! core token service, and a failed verification grants nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;

use ultimate_mcp_core::Role;
use ultimate_mcp_core::UserId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted authorization header size.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request context used for auth and audit decisions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Peer IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// Raw authorization header value.
    pub auth_header: Option<String>,
    /// Correlation id assigned by the transport.
    pub correlation_id: String,
}

impl RequestContext {
    /// Builds a context for an incoming request.
    #[must_use]
    pub fn new(
        peer_ip: Option<IpAddr>,
        auth_header: Option<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            peer_ip,
            auth_header,
            correlation_id: correlation_id.into(),
        }
    }

    /// Returns the rate-limit principal key: user id when authenticated,
    /// else peer address, else a shared anonymous bucket.
    #[must_use]
    pub fn principal_key(&self, identity: Option<&Identity>) -> String {
        if let Some(identity) = identity {
            return format!("user:{}", identity.user_id);
        }
        match self.peer_ip {
            Some(ip) => format!("ip:{ip}"),
            None => "anonymous".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Verified caller identity.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Authenticated user.
    pub user_id: UserId,
    /// Granted roles.
    pub roles: Vec<Role>,
}

// ============================================================================
// SECTION: Bearer Parsing
// ============================================================================

/// Extracts the bearer credential from an authorization header.
///
/// Returns `None` for absent, oversized, wrong-scheme, or empty credentials.
#[must_use]
pub fn parse_bearer_token(auth_header: Option<&str>) -> Option<String> {
    let header = auth_header?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return None;
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
