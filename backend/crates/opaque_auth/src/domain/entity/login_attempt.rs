//! Login Attempt Entity
//!
//! Append-only record of one authentication attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use kernel::id::LoginAttemptId;
use platform::client::RequestContext;

use crate::domain::value_object::PrincipalId;

/// Why an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginFailureReason {
    UnknownPrincipal,
    InvalidCredentials,
    AccountDisabled,
    AccountLocked,
    RateLimited,
}

impl LoginFailureReason {
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownPrincipal => "unknown_principal",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountDisabled => "account_disabled",
            Self::AccountLocked => "account_locked",
            Self::RateLimited => "rate_limited",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "unknown_principal" => Some(Self::UnknownPrincipal),
            "invalid_credentials" => Some(Self::InvalidCredentials),
            "account_disabled" => Some(Self::AccountDisabled),
            "account_locked" => Some(Self::AccountLocked),
            "rate_limited" => Some(Self::RateLimited),
            _ => None,
        }
    }
}

impl fmt::Display for LoginFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: LoginAttemptId,
    /// None when the identifier matched no principal
    pub principal_id: Option<PrincipalId>,
    pub email: String,
    pub success: bool,
    pub failure_reason: Option<LoginFailureReason>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: String,
}

impl LoginAttempt {
    pub fn succeeded(
        principal_id: PrincipalId,
        email: &str,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self::build(Some(principal_id), email, None, ctx, now)
    }

    pub fn failed(
        principal_id: Option<PrincipalId>,
        email: &str,
        reason: LoginFailureReason,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self::build(principal_id, email, Some(reason), ctx, now)
    }

    fn build(
        principal_id: Option<PrincipalId>,
        email: &str,
        failure_reason: Option<LoginFailureReason>,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LoginAttemptId::new(),
            principal_id,
            email: email.to_string(),
            success: failure_reason.is_none(),
            failure_reason,
            client_ip: ctx.ip_string(),
            user_agent: ctx.user_agent.clone(),
            occurred_at: now,
            correlation_id: ctx.correlation_id.clone(),
        }
    }
}
