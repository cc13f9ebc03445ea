//! Session Validation
//!
//! Per-request token check with sliding expiration. Holds no state of its
//! own; every decision is derived from the primary tier and the directory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use platform::client::RequestContext;
use platform::clock::Clock;

use crate::application::config::EngineConfig;
use crate::application::token_store::TokenStore;
use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome, AuditSink};
use crate::domain::entity::principal::PrincipalAccess;
use crate::domain::repository::{DurableTokenTier, PrimaryTokenTier, PrincipalDirectory, TouchOutcome};
use crate::domain::services::TokenCodec;
use crate::domain::value_object::{PrincipalId, SessionKind, TokenHash};
use crate::error::{AuthError, AuthResult};

/// A successfully validated token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSession {
    pub principal_id: PrincipalId,
    pub session_kind: SessionKind,
    pub expires_at: DateTime<Utc>,
    /// Truncated hash reference for logging by the caller
    pub token_ref: String,
}

struct Rejection {
    error: AuthError,
    principal_id: Option<PrincipalId>,
}

impl Rejection {
    fn anonymous(error: AuthError) -> Self {
        Self {
            error,
            principal_id: None,
        }
    }

    fn of(principal_id: PrincipalId, error: AuthError) -> Self {
        Self {
            error,
            principal_id: Some(principal_id),
        }
    }
}

/// Session validator
pub struct SessionValidator<P, D, R> {
    store: TokenStore<P, D>,
    directory: Arc<R>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl<P, D, R> SessionValidator<P, D, R>
where
    P: PrimaryTokenTier + Send + Sync + 'static,
    D: DurableTokenTier + Send + Sync + 'static,
    R: PrincipalDirectory + Send + Sync + 'static,
{
    pub fn new(
        store: TokenStore<P, D>,
        directory: Arc<R>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            directory,
            audit,
            clock,
            config,
        }
    }

    /// Validate a presented token and slide its expiry
    ///
    /// Emits exactly one `TOKEN_VALIDATED` or `TOKEN_REJECTED` event.
    /// Store failures deny access.
    pub async fn validate(
        &self,
        presented: &str,
        ctx: &RequestContext,
    ) -> AuthResult<ValidatedSession> {
        let now = self.clock.now();
        let hash = TokenCodec::hash(presented);
        if !TokenCodec::is_well_formed(presented) {
            // Still looked up; rejection takes the not-found path
            tracing::debug!(token_ref = %hash, "Malformed token presented");
        }

        match self.decide(&hash, now).await {
            Ok(session) => {
                self.audit.emit(
                    AuditEvent::new(AuditEventType::TokenValidated, AuditOutcome::Success, ctx, now)
                        .principal(session.principal_id)
                        .token(&hash),
                );
                tracing::debug!(
                    principal_id = %session.principal_id,
                    token_ref = %hash,
                    "Token validated"
                );
                Ok(session)
            }
            Err(rejection) => {
                self.audit.emit(
                    AuditEvent::new(AuditEventType::TokenRejected, AuditOutcome::Failure, ctx, now)
                        .maybe_principal(rejection.principal_id)
                        .reason(rejection.error.code())
                        .token(&hash),
                );
                rejection.error.log();
                Err(rejection.error)
            }
        }
    }

    /// Whether the token is currently valid (slides it as a side effect)
    pub async fn is_valid(&self, presented: &str, ctx: &RequestContext) -> bool {
        self.validate(presented, ctx).await.is_ok()
    }

    async fn decide(&self, hash: &TokenHash, now: DateTime<Utc>) -> Result<ValidatedSession, Rejection> {
        let record = match self.store.get(hash, now).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                // Same directory round trip as a known token.
                let _ = self.directory.find(&PrincipalId::nil()).await;
                return Err(Rejection::anonymous(AuthError::InvalidToken));
            }
            Err(e) => return Err(Rejection::anonymous(e)),
        };
        let principal_id = record.principal_id;

        if record.revoked {
            return Err(Rejection::of(principal_id, AuthError::RevokedToken));
        }
        if record.is_expired(now) {
            return Err(Rejection::of(principal_id, AuthError::ExpiredToken));
        }

        let principal = self
            .directory
            .find(&principal_id)
            .await
            .map_err(|e| Rejection::of(principal_id, e))?;
        match principal.map(|p| p.access_at(now)) {
            Some(PrincipalAccess::Allowed) => {}
            Some(PrincipalAccess::LockedUntil(until)) => {
                let retry_after = (until - now).to_std().unwrap_or_default();
                return Err(Rejection::of(
                    principal_id,
                    AuthError::UserLockedOut { retry_after },
                ));
            }
            Some(PrincipalAccess::Denied) | None => {
                return Err(Rejection::of(principal_id, AuthError::InvalidToken));
            }
        }

        let new_expiry = if record.session_kind.slides() {
            now + self.config.sliding_window_chrono()
        } else {
            record.expires_at
        };

        match self.store.touch(hash, now, new_expiry).await {
            Ok(TouchOutcome::Touched(touched)) => Ok(ValidatedSession {
                principal_id: touched.principal_id,
                session_kind: touched.session_kind,
                expires_at: touched.expires_at,
                token_ref: hash.short_ref().to_string(),
            }),
            // Lost a race with revoke or eviction between get and touch.
            Ok(TouchOutcome::Revoked) => Err(Rejection::of(principal_id, AuthError::RevokedToken)),
            Ok(TouchOutcome::Expired) => Err(Rejection::of(principal_id, AuthError::ExpiredToken)),
            Ok(TouchOutcome::NotFound) => Err(Rejection::of(principal_id, AuthError::InvalidToken)),
            Err(e) => Err(Rejection::of(principal_id, e)),
        }
    }
}
