// crates/ultimate-mcp-server/src/correlation.rs
// ============================================================================
// Module: Correlation Policy
// Description: Sanitization and generation for request correlation IDs.
// Purpose: Provide deterministic, fail-closed request-id handling.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! A client-supplied `X-Request-Id` is untrusted: it is accepted only when it
//! is a strict HTTP token of bounded length, and replaced otherwise. Server
//! ids are generated from a boot-scoped random seed plus a monotonic counter,
//! unique within the process lifetime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use rand::RngCore;
use rand::rngs::OsRng;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Maximum accepted client id length.
pub const MAX_REQUEST_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: Sanitization
// ============================================================================

/// Returns the client id when it is a valid token, else `None`.
#[must_use]
pub fn sanitize_request_id(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || value.len() > MAX_REQUEST_ID_LENGTH {
        return None;
    }
    if value.chars().all(is_tchar) { Some(value.to_string()) } else { None }
}

/// Returns true when the character is a valid HTTP token character.
const fn is_tchar(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '.'
                | '^'
                | '_'
                | '`'
                | '|'
                | '~'
        )
}

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Boot-scoped correlation id generator.
///
/// # Invariants
/// - Issued identifiers are unique within the process lifetime.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    /// Boot-scoped random identifier for entropy.
    boot_id: u64,
    /// Monotonic counter for ids issued in this process.
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Creates a new generator seeded from OS randomness.
    #[must_use]
    pub fn new() -> Self {
        let mut bytes = [0u8; 8];
        OsRng.fill_bytes(&mut bytes);
        Self {
            boot_id: u64::from_be_bytes(bytes),
            counter: AtomicU64::new(1),
        }
    }

    /// Issues a fresh server correlation id.
    #[must_use]
    pub fn issue(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("umcp-{:016x}-{:08x}", self.boot_id, seq)
    }

    /// Accepts a sanitized client id or issues a fresh one.
    #[must_use]
    pub fn accept_or_issue(&self, client_value: Option<&str>) -> String {
        sanitize_request_id(client_value).unwrap_or_else(|| self.issue())
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::CorrelationIdGenerator;
    use super::sanitize_request_id;

    #[test]
    fn valid_client_ids_are_preserved() {
        let generator = CorrelationIdGenerator::new();
        assert_eq!(
            generator.accept_or_issue(Some("client-abc.123")),
            "client-abc.123".to_string()
        );
        assert_eq!(sanitize_request_id(Some("  trimmed-ok  ")), Some("trimmed-ok".to_string()));
    }

    #[test]
    fn invalid_client_ids_are_replaced() {
        let generator = CorrelationIdGenerator::new();
        for bad in ["", "has space", "newline\n", "héllo", &"x".repeat(200)] {
            let issued = generator.accept_or_issue(Some(bad));
            assert!(issued.starts_with("umcp-"), "{bad:?} -> {issued}");
        }
    }

    #[test]
    fn issued_ids_are_unique() {
        let generator = CorrelationIdGenerator::new();
        let first = generator.issue();
        let second = generator.issue();
        assert_ne!(first, second);
    }
}
