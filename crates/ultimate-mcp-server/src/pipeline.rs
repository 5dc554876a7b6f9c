// crates/ultimate-mcp-server/src/pipeline.rs
// ============================================================================
// Module: Request Pipeline Gates
// Description: Ordered authenticate → authorize → rate-limit admission.
// Purpose: Run the security gates once, identically for both transports.
// Dependencies: ultimate-mcp-core, crate::{audit, auth}
// ============================================================================

//! ## Overview
//! The pipeline gates run strictly in order and short-circuit on the first
//! failure: authentication, then authorization, then rate limiting. Every
//! rejection emits an audit event before it is returned. Public routes admit
//! anonymous callers, but a presented credential is always verified: an
//! invalid token is rejected even where no token is required.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::json;
use thiserror::Error;
use ultimate_mcp_core::AuditEventType;
use ultimate_mcp_core::AuditSeverity;
use ultimate_mcp_core::Permission;
use ultimate_mcp_core::RateDecision;
use ultimate_mcp_core::RateLimiter;
use ultimate_mcp_core::TokenService;
use ultimate_mcp_core::allow;

use crate::audit::AuditLog;
use crate::auth::Identity;
use crate::auth::RequestContext;
use crate::auth::parse_bearer_token;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pipeline gate rejections.
#[derive(Debug, Error)]
pub enum GateError {
    /// Missing or invalid credential.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Authenticated but not permitted.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Rate limit exhausted.
    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the rejecting window resets.
        retry_after_secs: u64,
    },
    /// Rate limiter saturated with live principals.
    #[error("rate limiter over capacity")]
    OverCapacity,
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Shared security gates consulted before every tool handler.
#[derive(Clone)]
pub struct RequestPipeline {
    /// Token verification service.
    tokens: Arc<TokenService>,
    /// Per-principal rate limiter.
    limiter: Arc<RateLimiter>,
    /// Audit pipeline for gate decisions.
    audit: AuditLog,
}

impl RequestPipeline {
    /// Creates the pipeline over shared subsystems.
    #[must_use]
    pub fn new(tokens: Arc<TokenService>, limiter: Arc<RateLimiter>, audit: AuditLog) -> Self {
        Self {
            tokens,
            limiter,
            audit,
        }
    }

    /// Returns the shared token service.
    #[must_use]
    pub fn tokens(&self) -> Arc<TokenService> {
        Arc::clone(&self.tokens)
    }

    /// Runs the ordered gates for one request.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] from the first failing gate; an audit event has
    /// already been recorded when it does.
    pub fn admit(
        &self,
        ctx: &RequestContext,
        permission: Permission,
        public: bool,
    ) -> Result<Option<Identity>, GateError> {
        let identity = self.authenticate(ctx, public)?;
        self.authorize(ctx, identity.as_ref(), permission, public)?;
        self.charge(ctx, identity.as_ref())?;
        Ok(identity)
    }

    /// Gate 1: verify the presented credential, or require one.
    fn authenticate(
        &self,
        ctx: &RequestContext,
        public: bool,
    ) -> Result<Option<Identity>, GateError> {
        let token = parse_bearer_token(ctx.auth_header.as_deref());
        match token {
            Some(token) => match self.tokens.verify(&token) {
                Ok(claims) => {
                    let identity = Identity {
                        user_id: claims.sub,
                        roles: claims.roles,
                    };
                    self.audit.record(AuditLog::event(
                        AuditEventType::AuthSuccess,
                        AuditSeverity::Info,
                        &ctx.correlation_id,
                        Some(&identity.user_id),
                        Map::new(),
                    ));
                    Ok(Some(identity))
                }
                Err(err) => {
                    let mut attributes = Map::new();
                    attributes.insert("reason".to_string(), json!(err.to_string()));
                    self.audit.record(AuditLog::event(
                        AuditEventType::AuthFailure,
                        AuditSeverity::Warning,
                        &ctx.correlation_id,
                        None,
                        attributes,
                    ));
                    Err(GateError::Unauthenticated(err.to_string()))
                }
            },
            None if ctx.auth_header.is_some() => {
                // A header was sent but is not a usable bearer credential.
                self.audit.record(AuditLog::event(
                    AuditEventType::AuthFailure,
                    AuditSeverity::Warning,
                    &ctx.correlation_id,
                    None,
                    Map::new(),
                ));
                Err(GateError::Unauthenticated("invalid authorization header".to_string()))
            }
            None if public => Ok(None),
            None => {
                self.audit.record(AuditLog::event(
                    AuditEventType::AuthFailure,
                    AuditSeverity::Warning,
                    &ctx.correlation_id,
                    None,
                    Map::new(),
                ));
                Err(GateError::Unauthenticated("missing bearer token".to_string()))
            }
        }
    }

    /// Gate 2: check the route permission against the caller's roles.
    fn authorize(
        &self,
        ctx: &RequestContext,
        identity: Option<&Identity>,
        permission: Permission,
        public: bool,
    ) -> Result<(), GateError> {
        match identity {
            Some(identity) => {
                if allow(&identity.roles, permission) {
                    Ok(())
                } else {
                    let mut attributes = Map::new();
                    attributes.insert("permission".to_string(), json!(permission.label()));
                    self.audit.record(AuditLog::event(
                        AuditEventType::AuthzDenied,
                        AuditSeverity::Warning,
                        &ctx.correlation_id,
                        Some(&identity.user_id),
                        attributes,
                    ));
                    Err(GateError::PermissionDenied(permission.label().to_string()))
                }
            }
            // Anonymous access is only reachable on public routes.
            None if public => Ok(()),
            None => Err(GateError::Unauthenticated("missing bearer token".to_string())),
        }
    }

    /// Gate 3: charge the rate limiter for the resolved principal.
    fn charge(&self, ctx: &RequestContext, identity: Option<&Identity>) -> Result<(), GateError> {
        let key = ctx.principal_key(identity);
        match self.limiter.check(&key) {
            RateDecision::Allow => Ok(()),
            RateDecision::Limited {
                window,
                retry_after_secs,
            } => {
                let mut attributes = Map::new();
                attributes.insert("window".to_string(), json!(window));
                attributes.insert("principal".to_string(), json!(key));
                self.audit.record(AuditLog::event(
                    AuditEventType::RateLimited,
                    AuditSeverity::Warning,
                    &ctx.correlation_id,
                    identity.map(|identity| &identity.user_id),
                    attributes,
                ));
                Err(GateError::RateLimited {
                    retry_after_secs,
                })
            }
            RateDecision::OverCapacity => Err(GateError::OverCapacity),
        }
    }
}
