//! Lockout Policy
//!
//! Threshold and exponential backoff for failed logins.

use chrono::Duration;

use crate::error::{AuthError, AuthResult};

/// Lockout policy
///
/// Defaults: lock after 5 failures for 30 minutes, doubling on each further
/// breach, capped at 24 hours.
#[derive(Debug, Clone, PartialEq)]
pub struct LockoutPolicy {
    /// Failures before the first lockout
    pub threshold: u32,
    /// Duration of the first lockout
    pub base_duration: Duration,
    /// Multiplier applied per further breach
    pub growth_factor: f64,
    /// Upper bound for any single lockout
    pub max_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            base_duration: Duration::minutes(30),
            growth_factor: 2.0,
            max_duration: Duration::hours(24),
        }
    }
}

impl LockoutPolicy {
    /// Lockout duration for the `breach`-th breach (1-based)
    ///
    /// `min(base * factor^(breach - 1), max)`
    pub fn backoff(&self, breach: u32) -> Duration {
        let exponent = breach.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.base_duration.num_milliseconds() as f64;
        let scaled = base_ms * self.growth_factor.powi(exponent);
        let max_ms = self.max_duration.num_milliseconds();

        if !scaled.is_finite() || scaled >= max_ms as f64 {
            return self.max_duration;
        }
        Duration::milliseconds(scaled as i64)
    }

    /// 1-based breach number for a failure counter, if the threshold is crossed
    pub fn breach_for(&self, failed_attempts: u32) -> Option<u32> {
        (failed_attempts >= self.threshold).then(|| failed_attempts - self.threshold + 1)
    }

    pub fn validate(&self) -> AuthResult<()> {
        if self.threshold == 0 {
            return Err(AuthError::Config("Lockout threshold must be at least 1".into()));
        }
        if self.base_duration <= Duration::zero() {
            return Err(AuthError::Config("Lockout base duration must be positive".into()));
        }
        if !(self.growth_factor.is_finite() && self.growth_factor >= 1.0) {
            return Err(AuthError::Config(format!(
                "Lockout growth factor must be >= 1.0, got {}",
                self.growth_factor
            )));
        }
        if self.max_duration < self.base_duration {
            return Err(AuthError::Config(
                "Lockout max duration must not be shorter than the base duration".into(),
            ));
        }
        Ok(())
    }
}
