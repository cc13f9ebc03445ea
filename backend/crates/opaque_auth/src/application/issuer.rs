//! Token Issuance

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use platform::client::RequestContext;
use platform::clock::Clock;

use crate::application::config::{EngineConfig, to_chrono};
use crate::application::token_store::TokenStore;
use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome, AuditSink};
use crate::domain::entity::TokenRecord;
use crate::domain::repository::{DurableTokenTier, PrimaryTokenTier};
use crate::domain::services::TokenCodec;
use crate::domain::value_object::{PlaintextToken, PrincipalId, SessionKind};
use crate::error::{AuthError, AuthResult};

/// Generation attempts before giving up on hash collisions
const MAX_ISSUE_ATTEMPTS: usize = 2;

/// A freshly issued token
///
/// The only place the plaintext exists; hand it to the client and drop it.
pub struct IssuedToken {
    pub token: PlaintextToken,
    pub record: TokenRecord,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &self.token)
            .field("token_ref", &self.record.token_hash.short_ref())
            .field("principal_id", &self.record.principal_id)
            .field("expires_at", &self.record.expires_at)
            .finish()
    }
}

pub struct TokenIssuer<P, D> {
    store: TokenStore<P, D>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl<P, D> TokenIssuer<P, D>
where
    P: PrimaryTokenTier + Send + Sync + 'static,
    D: DurableTokenTier + Send + Sync + 'static,
{
    pub fn new(
        store: TokenStore<P, D>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            config,
        }
    }

    /// Issue a token with the sliding window as initial lifetime
    pub async fn issue(
        &self,
        principal_id: PrincipalId,
        session_kind: SessionKind,
        ctx: &RequestContext,
    ) -> AuthResult<IssuedToken> {
        self.issue_with_lifetime(principal_id, session_kind, self.config.sliding_window, ctx)
            .await
    }

    /// Issue a token with an explicit lifetime (API tokens)
    pub async fn issue_with_lifetime(
        &self,
        principal_id: PrincipalId,
        session_kind: SessionKind,
        lifetime: Duration,
        ctx: &RequestContext,
    ) -> AuthResult<IssuedToken> {
        let now = self.clock.now();

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let (token, hash) = TokenCodec::issue();
            let record = TokenRecord::issue(
                hash,
                principal_id,
                session_kind.clone(),
                now,
                to_chrono(lifetime),
                ctx.ip_string(),
                ctx.user_agent.clone(),
            )?;

            if self.store.put(&record).await? {
                tracing::info!(
                    principal_id = %principal_id,
                    token_ref = %record.token_hash,
                    session_kind = %record.session_kind,
                    expires_at = %record.expires_at,
                    "Token issued"
                );
                self.audit.emit(
                    AuditEvent::new(AuditEventType::TokenIssued, AuditOutcome::Success, ctx, now)
                        .principal(principal_id)
                        .reason(record.session_kind.code())
                        .token(&record.token_hash),
                );
                return Ok(IssuedToken { token, record });
            }

            tracing::error!(
                attempt,
                token_ref = %record.token_hash,
                "Token hash collision on issue"
            );
        }

        Err(AuthError::TokenGeneration)
    }
}
