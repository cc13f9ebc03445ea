//! Session Queries
//!
//! Read-only views over issued tokens. Nothing here slides or revokes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use platform::clock::Clock;
use serde::Serialize;

use crate::application::token_store::TokenStore;
use crate::domain::entity::TokenRecord;
use crate::domain::repository::{DurableTokenTier, PrimaryTokenTier};
use crate::domain::services::TokenCodec;
use crate::domain::value_object::{PrincipalId, SessionKind, TokenHash};
use crate::error::AuthResult;

/// Session info for listings (non-sensitive)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub token_ref: String,
    pub session_kind: SessionKind,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

impl From<&TokenRecord> for SessionInfo {
    fn from(record: &TokenRecord) -> Self {
        Self {
            token_ref: record.token_hash.short_ref().to_string(),
            session_kind: record.session_kind.clone(),
            client_ip: record.client_ip.clone(),
            user_agent: record.user_agent.clone(),
            created_at: record.created_at,
            last_used_at: record.last_used_at,
            expires_at: record.expires_at,
            is_current: false, // Set by caller
        }
    }
}

/// State of a single token, without side effects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub principal_id: PrincipalId,
    pub token_ref: String,
    pub session_kind: SessionKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub expired: bool,
}

pub struct SessionQueries<P, D> {
    store: TokenStore<P, D>,
    clock: Arc<dyn Clock>,
}

impl<P, D> SessionQueries<P, D>
where
    P: PrimaryTokenTier + Send + Sync + 'static,
    D: DurableTokenTier + Send + Sync + 'static,
{
    pub fn new(store: TokenStore<P, D>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Live sessions of a principal, newest first
    ///
    /// `current` marks the session the request itself was made with.
    pub async fn list_sessions(
        &self,
        principal_id: &PrincipalId,
        current: Option<&TokenHash>,
    ) -> AuthResult<Vec<SessionInfo>> {
        let now = self.clock.now();
        let mut records = self.store.active_for_principal(principal_id, now).await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(records
            .iter()
            .map(|record| SessionInfo {
                is_current: current == Some(&record.token_hash),
                ..SessionInfo::from(record)
            })
            .collect())
    }

    pub async fn count_active_sessions(&self, principal_id: &PrincipalId) -> AuthResult<u64> {
        let now = self.clock.now();
        Ok(self.store.active_for_principal(principal_id, now).await?.len() as u64)
    }

    /// Inspect a presented token without validating or sliding it
    pub async fn token_info(&self, presented: &str) -> AuthResult<Option<TokenInfo>> {
        let now = self.clock.now();
        let hash = TokenCodec::hash(presented);
        Ok(self.store.get(&hash, now).await?.map(|record| TokenInfo {
            principal_id: record.principal_id,
            token_ref: hash.short_ref().to_string(),
            expired: record.is_expired(now),
            session_kind: record.session_kind,
            created_at: record.created_at,
            expires_at: record.expires_at,
            last_used_at: record.last_used_at,
            revoked: record.revoked,
        }))
    }
}
