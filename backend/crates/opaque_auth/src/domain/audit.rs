//! Audit Events
//!
//! Structured security events emitted by every engine component. Events
//! carry the 8-character token reference, never the plaintext or the full
//! hash.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::Serialize;

use platform::client::RequestContext;

use crate::domain::value_object::{PrincipalId, TokenHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    #[display("TOKEN_ISSUED")]
    TokenIssued,
    #[display("TOKEN_VALIDATED")]
    TokenValidated,
    #[display("TOKEN_REJECTED")]
    TokenRejected,
    #[display("TOKEN_REVOKED")]
    TokenRevoked,
    #[display("TOKENS_REVOKED_FOR_PRINCIPAL")]
    TokensRevokedForPrincipal,
    #[display("LOGIN_SUCCEEDED")]
    LoginSucceeded,
    #[display("LOGIN_FAILED")]
    LoginFailed,
    #[display("ACCOUNT_LOCKED")]
    AccountLocked,
    #[display("ACCOUNT_UNLOCKED")]
    AccountUnlocked,
    #[display("TOKENS_PURGED")]
    TokensPurged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    #[display("success")]
    Success,
    #[display("failure")]
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub principal_id: Option<PrincipalId>,
    pub correlation_id: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    /// Machine-readable reason (error code, revocation reason)
    pub reason: Option<String>,
    /// First 8 hex chars of the token hash
    pub token_ref: Option<String>,
    /// Number of affected records for bulk events
    pub count: Option<u64>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        outcome: AuditOutcome,
        ctx: &RequestContext,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            principal_id: None,
            correlation_id: ctx.correlation_id.clone(),
            client_ip: ctx.ip_string(),
            user_agent: ctx.user_agent.clone(),
            timestamp,
            outcome,
            reason: None,
            token_ref: None,
            count: None,
        }
    }

    #[must_use]
    pub fn principal(mut self, principal_id: PrincipalId) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    #[must_use]
    pub fn maybe_principal(mut self, principal_id: Option<PrincipalId>) -> Self {
        self.principal_id = principal_id;
        self
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn token(mut self, hash: &TokenHash) -> Self {
        self.token_ref = Some(hash.short_ref().to_string());
        self
    }

    #[must_use]
    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

/// Destination for audit events
///
/// `emit` must not block the caller; slow or failing sinks drop events
/// and log instead of propagating errors into the security path.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}
