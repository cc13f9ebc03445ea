//! Revocation
//!
//! Single-token and per-principal revocation.

use std::sync::Arc;

use derive_more::Display;
use platform::client::RequestContext;
use platform::clock::Clock;

use crate::application::token_store::TokenStore;
use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome, AuditSink};
use crate::domain::repository::{DurableTokenTier, PrimaryTokenTier, RevokeOutcome};
use crate::domain::services::TokenCodec;
use crate::domain::value_object::{PrincipalId, TokenHash};
use crate::error::AuthResult;

/// Why every token of a principal is being revoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RevocationReason {
    #[display("password_changed")]
    PasswordChanged,
    #[display("logout_everywhere")]
    LogoutEverywhere,
    #[display("account_disabled")]
    AccountDisabled,
    #[display("account_locked")]
    AccountLocked,
    #[display("administrative")]
    Administrative,
}

pub struct RevocationManager<P, D> {
    store: TokenStore<P, D>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl<P, D> RevocationManager<P, D>
where
    P: PrimaryTokenTier + Send + Sync + 'static,
    D: DurableTokenTier + Send + Sync + 'static,
{
    pub fn new(store: TokenStore<P, D>, audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            audit,
            clock,
        }
    }

    /// Revoke one token by hash
    ///
    /// Idempotent: unknown and already revoked tokens succeed without
    /// change. Returns whether this call performed the revocation.
    pub async fn revoke_token(&self, hash: &TokenHash, ctx: &RequestContext) -> AuthResult<bool> {
        let now = self.clock.now();
        match self.store.revoke(hash, now).await? {
            RevokeOutcome::Revoked(record) => {
                tracing::info!(
                    principal_id = %record.principal_id,
                    token_ref = %hash,
                    "Token revoked"
                );
                self.audit.emit(
                    AuditEvent::new(AuditEventType::TokenRevoked, AuditOutcome::Success, ctx, now)
                        .principal(record.principal_id)
                        .token(hash),
                );
                Ok(true)
            }
            RevokeOutcome::AlreadyRevoked | RevokeOutcome::NotFound => {
                tracing::debug!(token_ref = %hash, "Revoke on inactive token ignored");
                Ok(false)
            }
        }
    }

    /// Revoke the token presented by the client (logout)
    pub async fn revoke_presented(&self, presented: &str, ctx: &RequestContext) -> AuthResult<bool> {
        self.revoke_token(&TokenCodec::hash(presented), ctx).await
    }

    /// Revoke every live token of a principal
    ///
    /// Emits one summary event carrying the revoked count.
    pub async fn revoke_all_for_principal(
        &self,
        principal_id: &PrincipalId,
        reason: RevocationReason,
        ctx: &RequestContext,
    ) -> AuthResult<u64> {
        let now = self.clock.now();
        let report = self.store.revoke_all_for_principal(principal_id, now).await?;

        tracing::info!(
            principal_id = %principal_id,
            reason = %reason,
            revoked = report.revoked,
            scanned = report.scanned,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Revoked all tokens for principal"
        );
        self.audit.emit(
            AuditEvent::new(
                AuditEventType::TokensRevokedForPrincipal,
                AuditOutcome::Success,
                ctx,
                now,
            )
            .principal(*principal_id)
            .reason(reason.to_string())
            .count(report.revoked),
        );

        Ok(report.revoked)
    }
}
