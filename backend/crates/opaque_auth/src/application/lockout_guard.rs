//! Lockout Guard
//!
//! Failed-login accounting with exponential lockout. All counter changes
//! happen inside the backing store in a single atomic operation.

use std::sync::Arc;
use std::time::Duration;

use platform::client::RequestContext;
use platform::clock::Clock;

use crate::application::config::EngineConfig;
use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome, AuditSink};
use crate::domain::entity::FailureOutcome;
use crate::domain::repository::LockoutStore;
use crate::domain::value_object::PrincipalId;
use crate::error::AuthResult;

/// Whether a login attempt may proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutDecision {
    Allowed,
    Locked { retry_after: Duration },
}

impl LockoutDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

pub struct LockoutGuard<L> {
    store: Arc<L>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl<L> LockoutGuard<L>
where
    L: LockoutStore + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<L>,
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

    /// Check whether the principal may attempt a login
    ///
    /// An elapsed lockout counts as allowed without any write.
    pub async fn check_allowed(&self, principal_id: &PrincipalId) -> AuthResult<LockoutDecision> {
        let now = self.clock.now();
        let decision = match self.store.get(principal_id).await? {
            Some(state) => match state.retry_after(now) {
                Some(retry_after) => LockoutDecision::Locked { retry_after },
                None => LockoutDecision::Allowed,
            },
            None => LockoutDecision::Allowed,
        };
        Ok(decision)
    }

    /// Record a failed credential check
    ///
    /// Emits `LOGIN_FAILED`, plus `ACCOUNT_LOCKED` when this failure starts
    /// a lockout.
    pub async fn record_failure(
        &self,
        principal_id: &PrincipalId,
        ctx: &RequestContext,
    ) -> AuthResult<FailureOutcome> {
        let now = self.clock.now();
        let outcome = self
            .store
            .record_failure(principal_id, now, &self.config.lockout)
            .await?;

        self.audit.emit(
            AuditEvent::new(AuditEventType::LoginFailed, AuditOutcome::Failure, ctx, now)
                .principal(*principal_id)
                .reason("invalid_credentials")
                .count(u64::from(outcome.state.failed_attempts)),
        );

        if let Some(locked_until) = outcome.locked_until {
            let lockout_secs = (locked_until - now).num_seconds();
            tracing::warn!(
                principal_id = %principal_id,
                failed_attempts = outcome.state.failed_attempts,
                lockout_count = outcome.state.lockout_count,
                lockout_secs,
                "Account locked after repeated login failures"
            );
            self.audit.emit(
                AuditEvent::new(AuditEventType::AccountLocked, AuditOutcome::Success, ctx, now)
                    .principal(*principal_id)
                    .reason(format!("locked_for_{lockout_secs}s"))
                    .count(u64::from(outcome.state.failed_attempts)),
            );
        }

        Ok(outcome)
    }

    /// Store the same failure write as `record_failure` against the nil
    /// principal, without audit
    ///
    /// Keeps login rejections that never reach a real counter as costly as
    /// a wrong password.
    pub async fn record_unattributed_failure(&self) {
        let now = self.clock.now();
        if let Err(e) = self
            .store
            .record_failure(&PrincipalId::nil(), now, &self.config.lockout)
            .await
        {
            tracing::debug!(error = %e, "Unattributed failure write failed");
        }
    }

    /// Record a successful login: counter to zero, lockout cleared
    pub async fn record_success(
        &self,
        principal_id: &PrincipalId,
        ctx: &RequestContext,
    ) -> AuthResult<()> {
        let now = self.clock.now();
        let previous = self.store.reset(principal_id, now).await?;

        if previous.is_some_and(|state| state.lockout_expiry.is_some()) {
            self.audit.emit(
                AuditEvent::new(AuditEventType::AccountUnlocked, AuditOutcome::Success, ctx, now)
                    .principal(*principal_id)
                    .reason("login_succeeded"),
            );
        }
        Ok(())
    }

    /// Administrative unlock
    ///
    /// Returns whether a lockout was running.
    pub async fn unlock(&self, principal_id: &PrincipalId, ctx: &RequestContext) -> AuthResult<bool> {
        let now = self.clock.now();
        let previous = self.store.reset(principal_id, now).await?;
        let was_locked = previous.is_some_and(|state| state.is_locked_at(now));

        tracing::info!(principal_id = %principal_id, was_locked, "Account unlocked by administrator");
        self.audit.emit(
            AuditEvent::new(AuditEventType::AccountUnlocked, AuditOutcome::Success, ctx, now)
                .principal(*principal_id)
                .reason("administrative"),
        );
        Ok(was_locked)
    }

    /// Current consecutive failure count
    pub async fn failed_attempts(&self, principal_id: &PrincipalId) -> AuthResult<u32> {
        Ok(self
            .store
            .get(principal_id)
            .await?
            .map(|state| state.failed_attempts)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::audit::MemoryAuditSink;
    use crate::infra::memory::InMemoryLockoutStore;
    use chrono::Duration as ChronoDuration;
    use platform::clock::ManualClock;

    fn guard() -> (LockoutGuard<InMemoryLockoutStore>, Arc<MemoryAuditSink>, Arc<ManualClock>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::default());
        let guard = LockoutGuard::new(
            Arc::new(InMemoryLockoutStore::new()),
            audit.clone(),
            clock.clone(),
            Arc::new(EngineConfig::default()),
        );
        (guard, audit, clock)
    }

    #[tokio::test]
    async fn test_escalation_and_reset() {
        let (guard, audit, clock) = guard();
        let principal_id = PrincipalId::new();
        let ctx = RequestContext::system();

        for _ in 0..5 {
            guard.record_failure(&principal_id, &ctx).await.unwrap();
        }
        assert_eq!(
            guard.check_allowed(&principal_id).await.unwrap(),
            LockoutDecision::Locked {
                retry_after: Duration::from_secs(30 * 60)
            }
        );
        assert_eq!(audit.count(AuditEventType::AccountLocked), 1);

        // A failure during the lockout does not reduce the remaining time
        clock.advance(ChronoDuration::minutes(10));
        guard.record_failure(&principal_id, &ctx).await.unwrap();
        assert_eq!(
            guard.check_allowed(&principal_id).await.unwrap(),
            LockoutDecision::Locked {
                retry_after: Duration::from_secs(20 * 60)
            }
        );
        assert_eq!(audit.count(AuditEventType::AccountLocked), 1);

        clock.advance(ChronoDuration::minutes(21));
        assert!(guard.check_allowed(&principal_id).await.unwrap().is_allowed());

        guard.record_success(&principal_id, &ctx).await.unwrap();
        assert_eq!(guard.failed_attempts(&principal_id).await.unwrap(), 0);
        assert_eq!(audit.count(AuditEventType::AccountUnlocked), 1);
        assert_eq!(audit.count(AuditEventType::LoginFailed), 6);
    }

    #[tokio::test]
    async fn test_success_without_lockout_is_quiet() {
        let (guard, audit, _) = guard();
        let principal_id = PrincipalId::new();
        let ctx = RequestContext::system();

        guard.record_failure(&principal_id, &ctx).await.unwrap();
        guard.record_success(&principal_id, &ctx).await.unwrap();
        assert_eq!(audit.count(AuditEventType::AccountUnlocked), 0);
    }

    #[tokio::test]
    async fn test_admin_unlock() {
        let (guard, audit, _) = guard();
        let principal_id = PrincipalId::new();
        let ctx = RequestContext::system();

        for _ in 0..5 {
            guard.record_failure(&principal_id, &ctx).await.unwrap();
        }
        assert!(guard.unlock(&principal_id, &ctx).await.unwrap());
        assert!(guard.check_allowed(&principal_id).await.unwrap().is_allowed());
        assert_eq!(guard.failed_attempts(&principal_id).await.unwrap(), 0);

        let unlocked = audit.of_type(AuditEventType::AccountUnlocked);
        assert_eq!(unlocked[0].reason.as_deref(), Some("administrative"));
        assert!(!guard.unlock(&principal_id, &ctx).await.unwrap());
    }
}
