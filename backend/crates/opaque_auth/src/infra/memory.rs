//! In-Memory Store Implementations
//!
//! Single-node implementations of every store trait. Each operation runs
//! under one mutex acquisition, which gives the same atomicity as the
//! scripted/SQL implementations. No lock is held across an await.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::entity::{FailureOutcome, LockoutState, LoginAttempt, Principal, TokenRecord};
use crate::domain::policy::LockoutPolicy;
use crate::domain::repository::{
    DurableTokenTier, LockoutStore, LoginAttemptLog, PrimaryTokenTier, PrincipalDirectory,
    PurgeCounts, RevokeOutcome, TouchOutcome,
};
use crate::domain::value_object::{PrincipalId, PrincipalStatus, TokenHash};
use crate::error::{AuthError, AuthResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Primary token tier
// ============================================================================

struct TierEntry {
    record: TokenRecord,
    evict_at: DateTime<Utc>,
}

/// Inserts between two full eviction sweeps
const SWEEP_INTERVAL: usize = 256;

#[derive(Default)]
struct TierState {
    records: HashMap<TokenHash, TierEntry>,
    by_principal: HashMap<PrincipalId, HashSet<TokenHash>>,
    inserts_since_sweep: usize,
}

impl TierState {
    /// Drop the entry if its eviction time has passed
    fn live_entry(&mut self, hash: &TokenHash, now: DateTime<Utc>) -> Option<&mut TierEntry> {
        let evicted = self
            .records
            .get(hash)
            .is_some_and(|entry| now > entry.evict_at);
        if evicted {
            self.remove(hash);
            return None;
        }
        self.records.get_mut(hash)
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let evicted: Vec<TokenHash> = self
            .records
            .iter()
            .filter(|(_, entry)| now > entry.evict_at)
            .map(|(hash, _)| hash.clone())
            .collect();
        for hash in &evicted {
            self.remove(hash);
        }
        self.inserts_since_sweep = 0;
        evicted.len()
    }

    fn remove(&mut self, hash: &TokenHash) {
        if let Some(entry) = self.records.remove(hash) {
            let principal_id = entry.record.principal_id;
            if let Some(set) = self.by_principal.get_mut(&principal_id) {
                set.remove(hash);
                if set.is_empty() {
                    self.by_principal.remove(&principal_id);
                }
            }
        }
    }
}

/// Primary tier held in process memory
pub struct InMemoryTokenTier {
    state: Mutex<TierState>,
    available: AtomicBool,
}

impl Default for InMemoryTokenTier {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTokenTier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TierState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage; every call fails with `StoreUnavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Remove entries past their eviction time
    ///
    /// Also runs on every `SWEEP_INTERVAL`-th insert, so tokens that are
    /// never presented again do not accumulate.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        lock(&self.state).sweep(now)
    }

    /// Drop everything (simulates losing the cache)
    pub fn clear(&self) {
        *lock(&self.state) = TierState::default();
    }

    pub fn len(&self) -> usize {
        lock(&self.state).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> AuthResult<MutexGuard<'_, TierState>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AuthError::StoreUnavailable(
                "in-memory token tier offline".into(),
            ));
        }
        Ok(lock(&self.state))
    }
}

impl PrimaryTokenTier for InMemoryTokenTier {
    async fn put_if_absent(
        &self,
        record: &TokenRecord,
        evict_at: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let mut state = self.state()?;
        if state.live_entry(&record.token_hash, record.created_at).is_some() {
            return Ok(false);
        }
        state.records.insert(
            record.token_hash.clone(),
            TierEntry {
                record: record.clone(),
                evict_at,
            },
        );
        state
            .by_principal
            .entry(record.principal_id)
            .or_default()
            .insert(record.token_hash.clone());

        state.inserts_since_sweep += 1;
        if state.inserts_since_sweep >= SWEEP_INTERVAL {
            let evicted = state.sweep(record.created_at);
            if evicted > 0 {
                tracing::debug!(evicted, "Swept evicted tokens from memory tier");
            }
        }
        Ok(true)
    }

    async fn get(&self, hash: &TokenHash, now: DateTime<Utc>) -> AuthResult<Option<TokenRecord>> {
        let mut state = self.state()?;
        Ok(state.live_entry(hash, now).map(|entry| entry.record.clone()))
    }

    async fn touch(
        &self,
        hash: &TokenHash,
        now: DateTime<Utc>,
        new_expiry: DateTime<Utc>,
        evict_at: DateTime<Utc>,
    ) -> AuthResult<TouchOutcome> {
        let mut state = self.state()?;
        let Some(entry) = state.live_entry(hash, now) else {
            return Ok(TouchOutcome::NotFound);
        };
        if entry.record.revoked {
            return Ok(TouchOutcome::Revoked);
        }
        if entry.record.is_expired(now) {
            return Ok(TouchOutcome::Expired);
        }

        let touched = entry.record.touched(now, new_expiry);
        entry.evict_at = entry.evict_at.max(evict_at);
        entry.record = touched.clone();
        Ok(TouchOutcome::Touched(touched))
    }

    async fn revoke(&self, hash: &TokenHash, now: DateTime<Utc>) -> AuthResult<RevokeOutcome> {
        let mut state = self.state()?;
        let Some(entry) = state.live_entry(hash, now) else {
            return Ok(RevokeOutcome::NotFound);
        };
        if entry.record.revoked {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        let revoked = entry.record.revoked_at(now);
        entry.record = revoked.clone();
        Ok(RevokeOutcome::Revoked(revoked))
    }

    async fn hashes_for_principal(&self, principal_id: &PrincipalId) -> AuthResult<Vec<TokenHash>> {
        let state = self.state()?;
        Ok(state
            .by_principal
            .get(principal_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// Durable token archive
// ============================================================================

/// Durable tier stand-in with optional latency and failure injection
#[derive(Default)]
pub struct InMemoryTokenArchive {
    records: Mutex<HashMap<TokenHash, TokenRecord>>,
    tombstones: Mutex<HashMap<TokenHash, DateTime<Utc>>>,
    latency: Option<Duration>,
    issue_latency: Option<Duration>,
    failing: AtomicBool,
}

impl InMemoryTokenArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Delay only issuance writes, so they land after later revocations
    pub fn with_issue_latency(latency: Duration) -> Self {
        Self {
            issue_latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn find(&self, hash: &TokenHash) -> Option<TokenRecord> {
        lock(&self.records).get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn ready(&self) -> AuthResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthError::StoreUnavailable(
                "in-memory archive offline".into(),
            ));
        }
        Ok(())
    }
}

impl DurableTokenTier for InMemoryTokenArchive {
    async fn record_issued(&self, record: &TokenRecord) -> AuthResult<()> {
        if let Some(latency) = self.issue_latency {
            tokio::time::sleep(latency).await;
        }
        self.ready().await?;
        // Lock order: records, then tombstones.
        let mut records = lock(&self.records);
        let tombstone = lock(&self.tombstones).get(&record.token_hash).copied();
        records
            .entry(record.token_hash.clone())
            .or_insert_with(|| match tombstone {
                Some(at) => record.revoked_at(at),
                None => record.clone(),
            });
        Ok(())
    }

    async fn record_revoked(&self, record: &TokenRecord) -> AuthResult<()> {
        self.ready().await?;
        let revoked_at = record.revoked_at.unwrap_or(record.created_at);
        lock(&self.records)
            .entry(record.token_hash.clone())
            .and_modify(|archived| *archived = archived.revoked_at(revoked_at))
            .or_insert_with(|| record.revoked_at(revoked_at));
        Ok(())
    }

    async fn record_tombstone(&self, hash: &TokenHash, revoked_at: DateTime<Utc>) -> AuthResult<()> {
        self.ready().await?;
        let mut records = lock(&self.records);
        lock(&self.tombstones).entry(hash.clone()).or_insert(revoked_at);
        if let Some(record) = records.get_mut(hash) {
            *record = record.revoked_at(revoked_at);
        }
        Ok(())
    }

    async fn record_touched(
        &self,
        hash: &TokenHash,
        last_used_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        self.ready().await?;
        let mut records = lock(&self.records);
        if let Some(record) = records.get_mut(hash).filter(|r| !r.revoked) {
            *record = record.touched(last_used_at, expires_at);
        }
        Ok(())
    }

    async fn find_active_for_principal(
        &self,
        principal_id: &PrincipalId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<TokenRecord>> {
        self.ready().await?;
        let mut active: Vec<TokenRecord> = lock(&self.records)
            .values()
            .filter(|r| r.principal_id == *principal_id && r.is_active(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn find_active(&self, now: DateTime<Utc>) -> AuthResult<Vec<TokenRecord>> {
        self.ready().await?;
        Ok(lock(&self.records)
            .values()
            .filter(|r| r.is_active(now))
            .cloned()
            .collect())
    }

    async fn purge(&self, cutoff: DateTime<Utc>) -> AuthResult<PurgeCounts> {
        self.ready().await?;
        let mut counts = PurgeCounts::default();
        lock(&self.records).retain(|_, record| {
            match record.revoked_at {
                Some(at) if at < cutoff => counts.revoked += 1,
                _ if record.expires_at < cutoff => counts.expired += 1,
                _ => return true,
            }
            false
        });
        lock(&self.tombstones).retain(|_, at| {
            if *at < cutoff {
                counts.revoked += 1;
                return false;
            }
            true
        });
        Ok(counts)
    }
}

// ============================================================================
// Lockout store
// ============================================================================

#[derive(Default)]
pub struct InMemoryLockoutStore {
    states: Mutex<HashMap<PrincipalId, LockoutState>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryLockoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls served so far, as (reads, writes)
    pub fn operation_counts(&self) -> (usize, usize) {
        (
            self.reads.load(Ordering::SeqCst),
            self.writes.load(Ordering::SeqCst),
        )
    }
}

impl LockoutStore for InMemoryLockoutStore {
    async fn get(&self, principal_id: &PrincipalId) -> AuthResult<Option<LockoutState>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.states).get(principal_id).cloned())
    }

    async fn record_failure(
        &self,
        principal_id: &PrincipalId,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AuthResult<FailureOutcome> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut states = lock(&self.states);
        let current = states
            .get(principal_id)
            .cloned()
            .unwrap_or_else(|| LockoutState::new(*principal_id, now));
        let outcome = current.apply_failure(now, policy);
        states.insert(*principal_id, outcome.state.clone());
        Ok(outcome)
    }

    async fn reset(
        &self,
        principal_id: &PrincipalId,
        _now: DateTime<Utc>,
    ) -> AuthResult<Option<LockoutState>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.states).remove(principal_id))
    }
}

// ============================================================================
// Login attempt log
// ============================================================================

#[derive(Default)]
pub struct InMemoryLoginAttemptLog {
    attempts: Mutex<Vec<LoginAttempt>>,
}

impl InMemoryLoginAttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<LoginAttempt> {
        lock(&self.attempts).clone()
    }
}

impl LoginAttemptLog for InMemoryLoginAttemptLog {
    async fn append(&self, attempt: &LoginAttempt) -> AuthResult<()> {
        lock(&self.attempts).push(attempt.clone());
        Ok(())
    }

    async fn recent_for_principal(
        &self,
        principal_id: &PrincipalId,
        limit: usize,
    ) -> AuthResult<Vec<LoginAttempt>> {
        Ok(lock(&self.attempts)
            .iter()
            .rev()
            .filter(|a| a.principal_id.as_ref() == Some(principal_id))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Principal directory
// ============================================================================

#[derive(Default)]
pub struct InMemoryPrincipalDirectory {
    principals: Mutex<HashMap<PrincipalId, Principal>>,
    lookups: AtomicUsize,
}

impl InMemoryPrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, principal: Principal) {
        lock(&self.principals).insert(principal.id, principal);
    }

    /// Register an active principal and return its id
    pub fn add_active(&self) -> PrincipalId {
        let id = PrincipalId::new();
        self.upsert(Principal::active(id));
        id
    }

    pub fn set_status(&self, principal_id: &PrincipalId, status: PrincipalStatus) {
        if let Some(principal) = lock(&self.principals).get_mut(principal_id) {
            principal.status = status;
        }
    }

    pub fn remove(&self, principal_id: &PrincipalId) {
        lock(&self.principals).remove(principal_id);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl PrincipalDirectory for InMemoryPrincipalDirectory {
    async fn find(&self, principal_id: &PrincipalId) -> AuthResult<Option<Principal>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.principals).get(principal_id).cloned())
    }
}
