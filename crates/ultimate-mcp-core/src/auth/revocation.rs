// crates/ultimate-mcp-core/src/auth/revocation.rs
// ============================================================================
// Module: Revocation Store
// Description: Token-hash blacklist and per-user revocation cutoffs.
// Purpose: Make issued tokens refusable before their natural expiry.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Two revocation facts exist: a blacklisted token hash (kept until the token
//! would have expired anyway) and a per-user cutoff that rejects every token
//! issued at or before it. The store is append-mostly with a periodic sweep;
//! reads take a shared lock and never block writers for long.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::identifiers::UserId;
use crate::core::time::epoch_secs;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Blacklist row for a single token hash.
#[derive(Debug, Clone)]
struct BlacklistEntry {
    /// Unix seconds after which the row is sweepable.
    expires_at: u64,
    /// Operator-supplied reason, kept for audit.
    reason: String,
}

/// In-process revocation facts with periodic sweep.
pub struct RevocationStore {
    /// Token-hash blacklist.
    blacklist: RwLock<HashMap<String, BlacklistEntry>>,
    /// Per-user revocation cutoffs (unix seconds).
    user_cutoffs: RwLock<HashMap<UserId, u64>>,
}

impl RevocationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blacklist: RwLock::new(HashMap::new()),
            user_cutoffs: RwLock::new(HashMap::new()),
        }
    }

    /// Blacklists a token hash until `expires_at` (unix seconds).
    pub fn revoke_token(&self, token_hash: String, expires_at: u64, reason: &str) {
        if let Ok(mut blacklist) = self.blacklist.write() {
            blacklist.insert(
                token_hash,
                BlacklistEntry {
                    expires_at,
                    reason: reason.to_string(),
                },
            );
        }
    }

    /// Records a user-wide cutoff; tokens issued at or before it are rejected.
    pub fn revoke_user(&self, user_id: UserId, cutoff: u64) {
        if let Ok(mut cutoffs) = self.user_cutoffs.write() {
            let entry = cutoffs.entry(user_id).or_insert(0);
            if cutoff > *entry {
                *entry = cutoff;
            }
        }
    }

    /// Returns true when the token hash is blacklisted or the user cutoff
    /// covers the token's issue time.
    #[must_use]
    pub fn is_revoked(&self, token_hash: &str, user_id: &UserId, issued_at: u64) -> bool {
        let now = epoch_secs();
        if let Ok(blacklist) = self.blacklist.read() {
            if let Some(entry) = blacklist.get(token_hash) {
                if entry.expires_at >= now {
                    return true;
                }
            }
        }
        if let Ok(cutoffs) = self.user_cutoffs.read() {
            if let Some(cutoff) = cutoffs.get(user_id) {
                if issued_at <= *cutoff {
                    return true;
                }
            }
        }
        false
    }

    /// Returns the stored reason for a blacklisted hash, when present.
    #[must_use]
    pub fn reason(&self, token_hash: &str) -> Option<String> {
        self.blacklist
            .read()
            .ok()
            .and_then(|blacklist| blacklist.get(token_hash).map(|entry| entry.reason.clone()))
    }

    /// Removes blacklist rows past their expiry. Returns the removed count.
    pub fn sweep(&self, now: u64) -> usize {
        let Ok(mut blacklist) = self.blacklist.write() else {
            return 0;
        };
        let before = blacklist.len();
        blacklist.retain(|_, entry| entry.expires_at >= now);
        before - blacklist.len()
    }

    /// Returns the current blacklist size.
    #[must_use]
    pub fn blacklist_len(&self) -> usize {
        self.blacklist.read().map(|blacklist| blacklist.len()).unwrap_or(0)
    }
}

impl Default for RevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
