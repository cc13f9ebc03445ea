//! Lockout State Entity
//!
//! Per-principal failed-attempt counter and lockout expiry. Stores apply
//! the transitions below atomically; application code never does a
//! read-modify-write on this value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;

use crate::domain::policy::LockoutPolicy;
use crate::domain::value_object::PrincipalId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    pub principal_id: PrincipalId,
    /// Consecutive failures since the last success
    pub failed_attempts: u32,
    pub lockout_expiry: Option<DateTime<Utc>>,
    /// Lockouts started since the last success
    pub lockout_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// Result of applying one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureOutcome {
    pub state: LockoutState,
    /// Set only when this failure started a new lockout
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    pub fn new(principal_id: PrincipalId, now: DateTime<Utc>) -> Self {
        Self {
            principal_id,
            failed_attempts: 0,
            lockout_expiry: None,
            lockout_count: 0,
            updated_at: now,
        }
    }

    /// Locked while the expiry lies in the future
    #[inline]
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lockout_expiry, Some(until) if until > now)
    }

    /// Remaining lockout, None when not locked
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<StdDuration> {
        self.lockout_expiry
            .filter(|until| *until > now)
            .and_then(|until| (until - now).to_std().ok())
    }

    /// Apply one failed attempt
    ///
    /// The counter always increments. A new lockout starts only when the
    /// counter reaches the threshold and no lockout is running; failures
    /// during a lockout leave its expiry untouched.
    pub fn apply_failure(&self, now: DateTime<Utc>, policy: &LockoutPolicy) -> FailureOutcome {
        let failed_attempts = self.failed_attempts.saturating_add(1);
        let mut state = Self {
            failed_attempts,
            updated_at: now,
            ..self.clone()
        };

        let locked_until = match policy.breach_for(failed_attempts) {
            Some(breach) if !self.is_locked_at(now) => {
                let until = now + policy.backoff(breach);
                state.lockout_expiry = Some(until);
                state.lockout_count = self.lockout_count.saturating_add(1);
                Some(until)
            }
            _ => None,
        };

        FailureOutcome {
            state,
            locked_until,
        }
    }

    /// Cleared state after a success or an administrative unlock
    #[must_use]
    pub fn cleared(&self, now: DateTime<Utc>) -> Self {
        Self::new(self.principal_id, now)
    }
}
