//! Repository Traits
//!
//! Interfaces for the backing stores. Implementations live in the
//! infrastructure layer. Every mutating operation is a single atomic store
//! operation; callers never combine a read and a write into one decision.

use chrono::{DateTime, Utc};

use crate::domain::entity::{FailureOutcome, LockoutState, LoginAttempt, Principal, TokenRecord};
use crate::domain::policy::LockoutPolicy;
use crate::domain::value_object::{PrincipalId, TokenHash};
use crate::error::AuthResult;

/// Result of an atomic fetch-and-refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchOutcome {
    Touched(TokenRecord),
    NotFound,
    Revoked,
    Expired,
}

/// Result of an atomic compare-and-set revoke
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked(TokenRecord),
    AlreadyRevoked,
    NotFound,
}

/// Rows removed by a retention purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeCounts {
    pub expired: u64,
    pub revoked: u64,
}

impl PurgeCounts {
    pub fn total(&self) -> u64 {
        self.expired + self.revoked
    }
}

/// Primary (authoritative, TTL-bearing) token tier
///
/// `evict_at` is when the store may drop the entry; it lies after the
/// record's expiry so expired tokens stay distinguishable from unknown ones
/// for a short while.
#[trait_variant::make(PrimaryTokenTier: Send)]
pub trait LocalPrimaryTokenTier {
    /// Insert unless the hash exists; false on collision
    async fn put_if_absent(
        &self,
        record: &TokenRecord,
        evict_at: DateTime<Utc>,
    ) -> AuthResult<bool>;

    async fn get(&self, hash: &TokenHash, now: DateTime<Utc>) -> AuthResult<Option<TokenRecord>>;

    /// Refresh a live record; fails on revoked or expired records
    async fn touch(
        &self,
        hash: &TokenHash,
        now: DateTime<Utc>,
        new_expiry: DateTime<Utc>,
        evict_at: DateTime<Utc>,
    ) -> AuthResult<TouchOutcome>;

    /// Compare-and-set revoke
    async fn revoke(&self, hash: &TokenHash, now: DateTime<Utc>) -> AuthResult<RevokeOutcome>;

    /// Per-principal index, may be incomplete
    async fn hashes_for_principal(&self, principal_id: &PrincipalId) -> AuthResult<Vec<TokenHash>>;
}

/// Durable (append-mostly) token archive
#[trait_variant::make(DurableTokenTier: Send)]
pub trait LocalDurableTokenTier {
    /// Archive an issuance; duplicates are ignored
    ///
    /// Never clears a revocation already archived for the hash, including a
    /// tombstone written before the issuance arrived.
    async fn record_issued(&self, record: &TokenRecord) -> AuthResult<()>;

    /// Upsert a revoked record
    ///
    /// Inserts the full record when its issuance has not landed yet.
    async fn record_revoked(&self, record: &TokenRecord) -> AuthResult<()>;

    /// Mark a hash revoked without knowing its record
    async fn record_tombstone(&self, hash: &TokenHash, revoked_at: DateTime<Utc>) -> AuthResult<()>;

    async fn record_touched(
        &self,
        hash: &TokenHash,
        last_used_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Non-revoked, unexpired records of a principal
    async fn find_active_for_principal(
        &self,
        principal_id: &PrincipalId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<TokenRecord>>;

    /// All non-revoked, unexpired records (primary tier recovery)
    async fn find_active(&self, now: DateTime<Utc>) -> AuthResult<Vec<TokenRecord>>;

    /// Delete records expired or revoked before `cutoff`, and tombstones
    /// older than it
    async fn purge(&self, cutoff: DateTime<Utc>) -> AuthResult<PurgeCounts>;
}

/// Lockout counter store
#[trait_variant::make(LockoutStore: Send)]
pub trait LocalLockoutStore {
    async fn get(&self, principal_id: &PrincipalId) -> AuthResult<Option<LockoutState>>;

    /// Atomically apply one failure (see [`LockoutState::apply_failure`])
    async fn record_failure(
        &self,
        principal_id: &PrincipalId,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AuthResult<FailureOutcome>;

    /// Atomically clear counter and expiry, returning the previous state
    async fn reset(
        &self,
        principal_id: &PrincipalId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<LockoutState>>;
}

/// Append-only login attempt log
#[trait_variant::make(LoginAttemptLog: Send)]
pub trait LocalLoginAttemptLog {
    async fn append(&self, attempt: &LoginAttempt) -> AuthResult<()>;

    /// Newest first
    async fn recent_for_principal(
        &self,
        principal_id: &PrincipalId,
        limit: usize,
    ) -> AuthResult<Vec<LoginAttempt>>;
}

/// Read-only user directory
#[trait_variant::make(PrincipalDirectory: Send)]
pub trait LocalPrincipalDirectory {
    async fn find(&self, principal_id: &PrincipalId) -> AuthResult<Option<Principal>>;
}
