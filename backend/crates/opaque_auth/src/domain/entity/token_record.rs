//! Token Record Entity
//!
//! Server-side state of one issued token, keyed by its hash. Records are
//! values: every state change produces a new record and revoked records are
//! never changed again.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_object::{PrincipalId, SessionKind, TokenHash};
use crate::error::{AuthError, AuthResult};

/// Token record entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_hash: TokenHash,
    pub principal_id: PrincipalId,
    pub session_kind: SessionKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// None until first successful validation
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Origin IP at issuance
    pub client_ip: Option<String>,
    /// Origin User-Agent at issuance
    pub user_agent: Option<String>,
}

impl TokenRecord {
    /// Create a fresh record
    ///
    /// Lifetime is provided by the application layer (config), not hard-coded here.
    pub fn issue(
        token_hash: TokenHash,
        principal_id: PrincipalId,
        session_kind: SessionKind,
        now: DateTime<Utc>,
        lifetime: Duration,
        client_ip: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<Self> {
        if lifetime <= Duration::zero() {
            return Err(AuthError::Config(format!(
                "Token lifetime must be positive, got {}s",
                lifetime.num_seconds()
            )));
        }

        Ok(Self {
            token_hash,
            principal_id,
            session_kind,
            created_at: now,
            expires_at: now + lifetime,
            last_used_at: None,
            revoked: false,
            revoked_at: None,
            client_ip,
            user_agent,
        })
    }

    /// Expired strictly after `expires_at`
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Neither revoked nor expired
    #[inline]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired(now)
    }

    /// Record a successful use
    ///
    /// Expiry only ever moves forward, so `expires_at > created_at` survives
    /// every touch.
    #[must_use]
    pub fn touched(&self, now: DateTime<Utc>, new_expiry: DateTime<Utc>) -> Self {
        Self {
            expires_at: self.expires_at.max(new_expiry),
            last_used_at: Some(now),
            ..self.clone()
        }
    }

    /// Revoked copy; an already revoked record is returned unchanged
    #[must_use]
    pub fn revoked_at(&self, now: DateTime<Utc>) -> Self {
        if self.revoked {
            return self.clone();
        }
        Self {
            revoked: true,
            revoked_at: Some(now),
            ..self.clone()
        }
    }

    /// Whether the record may be physically deleted
    pub fn is_purgeable(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        if now > self.expires_at + grace {
            return true;
        }
        matches!(self.revoked_at, Some(at) if now > at + grace)
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::TokenCodec;

    fn record(now: DateTime<Utc>) -> TokenRecord {
        let (_, hash) = TokenCodec::issue();
        TokenRecord::issue(
            hash,
            PrincipalId::new(),
            SessionKind::Web,
            now,
            Duration::hours(24),
            Some("203.0.113.7".into()),
            Some("curl/8".into()),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_sets_window() {
        let now = Utc::now();
        let rec = record(now);
        assert_eq!(rec.expires_at, now + Duration::hours(24));
        assert!(rec.expires_at > rec.created_at);
        assert!(rec.last_used_at.is_none());
        assert!(rec.is_active(now));
    }

    #[test]
    fn test_issue_rejects_non_positive_lifetime() {
        let (_, hash) = TokenCodec::issue();
        let result = TokenRecord::issue(
            hash,
            PrincipalId::new(),
            SessionKind::Web,
            Utc::now(),
            Duration::zero(),
            None,
            None,
        );
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let rec = record(now);
        assert!(!rec.is_expired(rec.expires_at));
        assert!(rec.is_expired(rec.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_touch_never_moves_expiry_back() {
        let now = Utc::now();
        let rec = record(now);
        let later = now + Duration::hours(1);

        let slid = rec.touched(later, later + Duration::hours(24));
        assert_eq!(slid.expires_at, later + Duration::hours(24));
        assert_eq!(slid.last_used_at, Some(later));

        let shrunk = rec.touched(later, now);
        assert_eq!(shrunk.expires_at, rec.expires_at);
        assert!(shrunk.expires_at > shrunk.created_at);
    }

    #[test]
    fn test_revoke_is_sticky() {
        let now = Utc::now();
        let revoked = record(now).revoked_at(now);
        assert!(revoked.revoked);
        assert_eq!(revoked.revoked_at, Some(now));

        let again = revoked.revoked_at(now + Duration::minutes(5));
        assert_eq!(again, revoked);
    }

    #[test]
    fn test_purgeable() {
        let now = Utc::now();
        let grace = Duration::days(30);
        let rec = record(now);
        assert!(!rec.is_purgeable(now + Duration::days(30), grace));
        assert!(rec.is_purgeable(now + Duration::days(31) + Duration::seconds(1), grace));

        let revoked = rec.revoked_at(now);
        assert!(revoked.is_purgeable(now + grace + Duration::seconds(1), grace));
    }
}
