// crates/ultimate-mcp-core/src/auth/token.rs
// ============================================================================
// Module: Token Service
// Description: Issue and verify signed stateless bearer tokens.
// Purpose: Provide fail-closed HS256 credentials carrying subject and roles.
// Dependencies: jsonwebtoken, serde, sha2
// ============================================================================

//! ## Overview
//! Tokens are HS256-signed JWTs with claims `{sub, roles, iat, exp, iss}`.
//! Verification rejects bad signatures, expiry, wrong issuer, malformed
//! payloads, empty or unknown roles, blacklisted token hashes, and tokens
//! issued before a user-wide revocation cutoff. A failed verification grants
//! nothing: there is deliberately no default-role fallback.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use jsonwebtoken::errors::ErrorKind;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::auth::revocation::RevocationStore;
use crate::auth::rbac::Role;
use crate::core::hashing::hash_bytes_hex;
use crate::core::identifiers::UserId;
use crate::core::time::epoch_secs;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Token issuer claim value.
pub const TOKEN_ISSUER: &str = "ultimate-mcp";
/// Minimum accepted signing key length in bytes.
pub const MIN_SIGNING_KEY_BYTES: usize = 32;
/// Maximum accepted token length in bytes (pre-parse bound).
const MAX_TOKEN_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Claims
// ============================================================================

/// Verified token claims.
///
/// # Invariants
/// - `roles` is non-empty for every verified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier).
    pub sub: UserId,
    /// Granted roles.
    pub roles: Vec<Role>,
    /// Issued-at (unix seconds).
    pub iat: u64,
    /// Expiry (unix seconds).
    pub exp: u64,
    /// Issuer.
    pub iss: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token issuance and verification errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Signing key below the minimum entropy floor.
    #[error("signing key must be at least {MIN_SIGNING_KEY_BYTES} bytes")]
    WeakKey,
    /// Token failed signature, issuer, or shape checks.
    #[error("token rejected: {0}")]
    Invalid(String),
    /// Token lifetime has passed.
    #[error("token expired")]
    Expired,
    /// Token or its user has been revoked.
    #[error("token revoked")]
    Revoked,
}

// ============================================================================
// SECTION: Token Service
// ============================================================================

/// Issues and verifies platform bearer tokens.
pub struct TokenService {
    /// HS256 encoding key.
    encoding: EncodingKey,
    /// HS256 decoding key.
    decoding: DecodingKey,
    /// Default token lifetime in hours.
    default_ttl_hours: u64,
    /// Revocation facts consulted on every verify.
    revocations: Arc<RevocationStore>,
}

impl TokenService {
    /// Builds a token service over a shared revocation store.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::WeakKey`] when the key is shorter than the floor.
    pub fn new(
        signing_key: &[u8],
        default_ttl_hours: u64,
        revocations: Arc<RevocationStore>,
    ) -> Result<Self, AuthError> {
        if signing_key.len() < MIN_SIGNING_KEY_BYTES {
            return Err(AuthError::WeakKey);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(signing_key),
            decoding: DecodingKey::from_secret(signing_key),
            default_ttl_hours,
            revocations,
        })
    }

    /// Builds a token service from a configured secret string. The MAC key
    /// is the hex SHA-256 of the secret, so any non-empty secret yields a
    /// full-width key; secret-strength policy is enforced by configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::WeakKey`] when the secret is empty.
    pub fn from_secret(
        secret: &str,
        default_ttl_hours: u64,
        revocations: Arc<RevocationStore>,
    ) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::WeakKey);
        }
        let derived = hash_bytes_hex(secret.as_bytes());
        Self::new(derived.as_bytes(), default_ttl_hours, revocations)
    }

    /// Issues a signed token for the given subject and roles.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Invalid`] when the role list is empty or signing
    /// fails.
    pub fn issue(
        &self,
        user_id: &UserId,
        roles: &[Role],
        ttl_hours: Option<u64>,
    ) -> Result<String, AuthError> {
        if roles.is_empty() {
            return Err(AuthError::Invalid("token requires at least one role".to_string()));
        }
        let now = epoch_secs();
        let ttl_hours = ttl_hours.unwrap_or(self.default_ttl_hours);
        let claims = Claims {
            sub: user_id.clone(),
            roles: roles.to_vec(),
            iat: now,
            exp: now.saturating_add(ttl_hours.saturating_mul(3_600)),
            iss: TOKEN_ISSUER.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Invalid(format!("token signing failed: {err}")))
    }

    /// Verifies a token and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] on any signature, shape, expiry, or revocation
    /// failure. Callers must treat every error as unauthenticated.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() || token.len() > MAX_TOKEN_BYTES {
            return Err(AuthError::Invalid("token length out of bounds".to_string()));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidIssuer => AuthError::Invalid("wrong issuer".to_string()),
                ErrorKind::InvalidSignature => {
                    AuthError::Invalid("invalid signature".to_string())
                }
                _ => AuthError::Invalid(format!("malformed token: {err}")),
            },
        )?;
        let claims = data.claims;
        if claims.roles.is_empty() {
            return Err(AuthError::Invalid("token carries no roles".to_string()));
        }
        if self.revocations.is_revoked(&fingerprint(token), &claims.sub, claims.iat) {
            return Err(AuthError::Revoked);
        }
        Ok(claims)
    }

    /// Revokes a single token until its natural expiry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the token cannot be verified first.
    pub fn revoke(&self, token: &str, reason: &str) -> Result<(), AuthError> {
        let claims = self.verify(token)?;
        self.revocations.revoke_token(fingerprint(token), claims.exp, reason);
        Ok(())
    }

    /// Revokes every token issued to the user before now.
    pub fn revoke_all(&self, user_id: &UserId) {
        self.revocations.revoke_user(user_id.clone(), epoch_secs());
    }

    /// Returns the shared revocation store.
    #[must_use]
    pub fn revocations(&self) -> Arc<RevocationStore> {
        Arc::clone(&self.revocations)
    }
}

/// Returns the SHA-256 fingerprint of a token string.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    hash_bytes_hex(token.as_bytes())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
