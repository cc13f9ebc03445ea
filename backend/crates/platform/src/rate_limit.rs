//! Rate limiting decisions
//!
//! Rate limiting itself runs at the edge. The engine only receives the
//! decision and propagates a rejection unchanged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Rate limit check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitResult {
    pub fn allowed(remaining: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_at,
        }
    }

    pub fn rejected(reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at,
        }
    }

    /// Time until the window resets, zero if already past
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        (self.reset_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}
