//! Login Orchestration
//!
//! Combines the rate-limit decision, lockout accounting, the caller's
//! credential verdict, attempt logging and token issuance. Unknown
//! principals, wrong credentials and disabled accounts produce the same
//! `InvalidCredentials` error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use platform::client::RequestContext;
use platform::clock::Clock;
use platform::rate_limit::RateLimitResult;

use crate::application::config::EngineConfig;
use crate::application::issuer::{IssuedToken, TokenIssuer};
use crate::application::lockout_guard::{LockoutDecision, LockoutGuard};
use crate::application::revocation::{RevocationManager, RevocationReason};
use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome, AuditSink};
use crate::domain::entity::principal::PrincipalAccess;
use crate::domain::entity::{LoginAttempt, LoginFailureReason};
use crate::domain::repository::{
    DurableTokenTier, LockoutStore, LoginAttemptLog, PrimaryTokenTier, PrincipalDirectory,
};
use crate::domain::value_object::{PrincipalId, SessionKind};
use crate::error::{AuthError, AuthResult};

/// Login input
///
/// Credential verification happens outside the engine; only its verdict
/// arrives here.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Principal resolved from the identifier, None if nothing matched
    pub principal_id: Option<PrincipalId>,
    /// Identifier as typed, kept for the attempt log
    pub email: String,
    pub credentials_valid: bool,
    /// Decision of the edge rate limiter, if it ran
    pub rate_limit: Option<RateLimitResult>,
    pub session_kind: SessionKind,
}

pub struct Authenticator<P, D, L, A, R> {
    issuer: Arc<TokenIssuer<P, D>>,
    lockout: Arc<LockoutGuard<L>>,
    revocation: Arc<RevocationManager<P, D>>,
    attempts: Arc<A>,
    directory: Arc<R>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl<P, D, L, A, R> Authenticator<P, D, L, A, R>
where
    P: PrimaryTokenTier + Send + Sync + 'static,
    D: DurableTokenTier + Send + Sync + 'static,
    L: LockoutStore + Send + Sync + 'static,
    A: LoginAttemptLog + Send + Sync + 'static,
    R: PrincipalDirectory + Send + Sync + 'static,
{
    pub fn new(
        issuer: Arc<TokenIssuer<P, D>>,
        lockout: Arc<LockoutGuard<L>>,
        revocation: Arc<RevocationManager<P, D>>,
        attempts: Arc<A>,
        directory: Arc<R>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            issuer,
            lockout,
            revocation,
            attempts,
            directory,
            audit,
            clock,
            config,
        }
    }

    pub async fn authenticate(
        &self,
        request: LoginRequest,
        ctx: &RequestContext,
    ) -> AuthResult<IssuedToken> {
        let now = self.clock.now();

        if let Some(rate_limit) = request.rate_limit.as_ref().filter(|r| !r.allowed) {
            self.reject(&request, None, LoginFailureReason::RateLimited, ctx, now)
                .await;
            return Err(AuthError::RateLimited {
                retry_after: rate_limit.retry_after(now),
            });
        }

        // Every path does one directory lookup, one lockout read and one
        // lockout write, so response time does not reveal which one failed.
        let lookup_id = request.principal_id.unwrap_or_else(PrincipalId::nil);
        let Some(principal) = self.directory.find(&lookup_id).await? else {
            let _ = self.lockout.check_allowed(&PrincipalId::nil()).await;
            self.lockout.record_unattributed_failure().await;
            self.reject(&request, None, LoginFailureReason::UnknownPrincipal, ctx, now)
                .await;
            return Err(AuthError::InvalidCredentials);
        };
        let principal_id = principal.id;

        if let LockoutDecision::Locked { retry_after } =
            self.lockout.check_allowed(&principal_id).await?
        {
            self.reject(&request, Some(principal_id), LoginFailureReason::AccountLocked, ctx, now)
                .await;
            return Err(AuthError::UserLockedOut { retry_after });
        }

        match principal.access_at(now) {
            PrincipalAccess::Allowed => {}
            PrincipalAccess::LockedUntil(until) => {
                self.reject(&request, Some(principal_id), LoginFailureReason::AccountLocked, ctx, now)
                    .await;
                return Err(AuthError::UserLockedOut {
                    retry_after: (until - now).to_std().unwrap_or_default(),
                });
            }
            PrincipalAccess::Denied => {
                self.lockout.record_unattributed_failure().await;
                self.reject(&request, Some(principal_id), LoginFailureReason::AccountDisabled, ctx, now)
                    .await;
                return Err(AuthError::InvalidCredentials);
            }
        }

        if !request.credentials_valid {
            // record_failure emits LOGIN_FAILED itself
            let outcome = self.lockout.record_failure(&principal_id, ctx).await?;
            self.append_attempt(LoginAttempt::failed(
                Some(principal_id),
                &request.email,
                LoginFailureReason::InvalidCredentials,
                ctx,
                now,
            ))
            .await;

            if outcome.locked_until.is_some() && self.config.revoke_sessions_on_lockout {
                self.revocation
                    .revoke_all_for_principal(&principal_id, RevocationReason::AccountLocked, ctx)
                    .await?;
            }
            return Err(AuthError::InvalidCredentials);
        }

        self.lockout.record_success(&principal_id, ctx).await?;
        let issued = self
            .issuer
            .issue(principal_id, request.session_kind.clone(), ctx)
            .await?;

        self.append_attempt(LoginAttempt::succeeded(principal_id, &request.email, ctx, now))
            .await;
        self.audit.emit(
            AuditEvent::new(AuditEventType::LoginSucceeded, AuditOutcome::Success, ctx, now)
                .principal(principal_id)
                .token(&issued.record.token_hash),
        );
        tracing::info!(
            principal_id = %principal_id,
            token_ref = %issued.record.token_hash,
            "Login succeeded"
        );

        Ok(issued)
    }

    /// Log and audit a login refused before the credential check
    async fn reject(
        &self,
        request: &LoginRequest,
        principal_id: Option<PrincipalId>,
        reason: LoginFailureReason,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) {
        self.append_attempt(LoginAttempt::failed(
            principal_id,
            &request.email,
            reason,
            ctx,
            now,
        ))
        .await;
        self.audit.emit(
            AuditEvent::new(AuditEventType::LoginFailed, AuditOutcome::Failure, ctx, now)
                .maybe_principal(principal_id)
                .reason(reason.code()),
        );
    }

    async fn append_attempt(&self, attempt: LoginAttempt) {
        if let Err(e) = self.attempts.append(&attempt).await {
            tracing::warn!(
                correlation_id = %attempt.correlation_id,
                error = %e,
                "Failed to record login attempt"
            );
        }
    }
}
