//! Engine Configuration
//!
//! Lifetimes, lockout policy and timing bounds for the engine.

use std::time::Duration;

pub use crate::domain::policy::LockoutPolicy;
use crate::error::{AuthError, AuthResult};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sliding session window; each validation resets expiry to now + window (24 hours)
    pub sliding_window: Duration,
    /// How long expired records stay readable in the primary tier (1 hour)
    pub expired_record_grace: Duration,
    /// Retention after expiry or revocation before physical deletion (30 days)
    pub retention_period: Duration,
    /// Failed-login lockout policy
    pub lockout: LockoutPolicy,
    /// Revoke every token of a principal when it gets locked out
    pub revoke_sessions_on_lockout: bool,
    /// Target duration of a revoke-all sweep; overruns are logged (1 second)
    pub revoke_all_deadline: Duration,
    /// How long issuance/revocation wait for the durable mirror (2 seconds)
    pub durable_write_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sliding_window: Duration::from_secs(24 * 3600), // 24 hours
            expired_record_grace: Duration::from_secs(3600), // 1 hour
            retention_period: Duration::from_secs(30 * 24 * 3600), // 30 days
            lockout: LockoutPolicy::default(),
            revoke_sessions_on_lockout: false,
            revoke_all_deadline: Duration::from_secs(1),
            durable_write_timeout: Duration::from_secs(2),
        }
    }
}

/// Upper bound on the retention period, keeps cutoff arithmetic in range
const MAX_RETENTION: Duration = Duration::from_secs(36_500 * 24 * 3600);

impl EngineConfig {
    /// Short windows for local development
    pub fn development() -> Self {
        Self {
            sliding_window: Duration::from_secs(3600),
            lockout: LockoutPolicy {
                base_duration: chrono::Duration::minutes(1),
                max_duration: chrono::Duration::minutes(10),
                ..LockoutPolicy::default()
            },
            ..Default::default()
        }
    }

    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> AuthResult<()> {
        if self.sliding_window.is_zero() {
            return Err(AuthError::Config("Sliding window must be positive".into()));
        }
        if self.revoke_all_deadline.is_zero() {
            return Err(AuthError::Config("Revoke-all deadline must be positive".into()));
        }
        if self.retention_period > MAX_RETENTION {
            return Err(AuthError::Config(
                "Retention period must not exceed 100 years".into(),
            ));
        }
        self.lockout.validate()
    }

    /// Get sliding window in milliseconds
    pub fn sliding_window_ms(&self) -> i64 {
        self.sliding_window.as_millis() as i64
    }

    /// Get retention period in milliseconds
    pub fn retention_period_ms(&self) -> i64 {
        self.retention_period.as_millis() as i64
    }

    pub(crate) fn sliding_window_chrono(&self) -> chrono::Duration {
        to_chrono(self.sliding_window)
    }

    pub(crate) fn grace_chrono(&self) -> chrono::Duration {
        to_chrono(self.expired_record_grace)
    }

    pub(crate) fn retention_chrono(&self) -> chrono::Duration {
        to_chrono(self.retention_period)
    }
}

/// Saturating conversion; durations beyond chrono's range clamp to its maximum
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
