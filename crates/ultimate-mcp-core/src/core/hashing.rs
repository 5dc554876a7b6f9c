// crates/ultimate-mcp-core/src/core/hashing.rs
// ============================================================================
// Module: Content Hashing
// Description: SHA-256 content hashing over raw bytes and canonical JSON.
// Purpose: Provide deterministic hashes for code, cache keys, and tokens.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! All content hashes in the platform are SHA-256, hex-encoded lowercase.
//! Structured values (cache keys, query parameters) are first serialized to
//! RFC 8785 canonical JSON so equal values always hash identically regardless
//! of map ordering. Raw payloads (source code, tokens) hash over their bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Code Hash
// ============================================================================

/// SHA-256 digest of input source bytes, the idempotency key for lint and
/// execution artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeHash(String);

impl CodeHash {
    /// Hashes the given source text.
    #[must_use]
    pub fn of_source(source: &str) -> Self {
        Self(hash_bytes_hex(source.as_bytes()))
    }

    /// Returns the digest as a lowercase hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes canonical JSON and returns a lowercase hex digest.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json_hex<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes_hex(&bytes))
}

/// Hashes raw bytes and returns a lowercase hex digest.
#[must_use]
pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let hi = usize::from(byte >> 4);
        let lo = usize::from(byte & 0x0f);
        out.push(char::from(HEX[hi]));
        out.push(char::from(HEX[lo]));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::CodeHash;
    use super::hash_bytes_hex;
    use super::hash_canonical_json_hex;

    #[test]
    fn code_hash_matches_known_sha256() {
        // sha256("") is a fixed vector.
        let hash = CodeHash::of_source("");
        assert_eq!(
            hash.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn canonical_hash_ignores_key_order() {
        let left = json!({"b": 1, "a": 2});
        let right = json!({"a": 2, "b": 1});
        assert_eq!(
            hash_canonical_json_hex(&left).unwrap(),
            hash_canonical_json_hex(&right).unwrap()
        );
    }

    #[test]
    fn byte_hash_is_deterministic() {
        assert_eq!(hash_bytes_hex(b"print(6*7)"), hash_bytes_hex(b"print(6*7)"));
        assert_ne!(hash_bytes_hex(b"print(6*7)"), hash_bytes_hex(b"print(6*6)"));
    }
}
