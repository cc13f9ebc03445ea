//! Two-Tier Token Store
//!
//! The primary tier is authoritative for every validation decision. The
//! durable tier mirrors issuance, revocation and use on detached tasks, so
//! a cancelled caller never leaves a half-written archive entry and a slow
//! archive never delays a decision.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::application::config::EngineConfig;
use crate::domain::entity::TokenRecord;
use crate::domain::repository::{DurableTokenTier, PrimaryTokenTier, RevokeOutcome, TouchOutcome};
use crate::domain::value_object::{PrincipalId, TokenHash};
use crate::error::AuthResult;

/// Outcome of a revoke-all sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Tokens moved from live to revoked by this sweep
    pub revoked: u64,
    /// Hashes examined (primary index plus durable scan)
    pub scanned: u64,
    pub elapsed: std::time::Duration,
    pub deadline_exceeded: bool,
}

pub struct TokenStore<P, D> {
    primary: Arc<P>,
    durable: Arc<D>,
    config: Arc<EngineConfig>,
}

impl<P, D> Clone for TokenStore<P, D> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            durable: self.durable.clone(),
            config: self.config.clone(),
        }
    }
}

impl<P, D> TokenStore<P, D>
where
    P: PrimaryTokenTier + Send + Sync + 'static,
    D: DurableTokenTier + Send + Sync + 'static,
{
    pub fn new(primary: Arc<P>, durable: Arc<D>, config: Arc<EngineConfig>) -> Self {
        Self {
            primary,
            durable,
            config,
        }
    }

    fn evict_at(&self, expires_at: DateTime<Utc>) -> DateTime<Utc> {
        expires_at + self.config.grace_chrono()
    }

    /// Insert a new record
    ///
    /// Returns false when the hash is already present; the existing record
    /// is left untouched.
    pub async fn put(&self, record: &TokenRecord) -> AuthResult<bool> {
        let inserted = self
            .primary
            .put_if_absent(record, self.evict_at(record.expires_at))
            .await?;
        if !inserted {
            return Ok(false);
        }

        let durable = self.durable.clone();
        let archived = record.clone();
        self.mirror("issue", &record.token_hash, async move {
            durable.record_issued(&archived).await
        })
        .await;

        Ok(true)
    }

    pub async fn get(&self, hash: &TokenHash, now: DateTime<Utc>) -> AuthResult<Option<TokenRecord>> {
        self.primary.get(hash, now).await
    }

    /// Atomic fetch-and-refresh for sliding expiration
    pub async fn touch(
        &self,
        hash: &TokenHash,
        now: DateTime<Utc>,
        new_expiry: DateTime<Utc>,
    ) -> AuthResult<TouchOutcome> {
        let outcome = self
            .primary
            .touch(hash, now, new_expiry, self.evict_at(new_expiry))
            .await?;

        if let TouchOutcome::Touched(record) = &outcome {
            // Fire and forget: last_used_at in the archive may lag.
            let durable = self.durable.clone();
            let hash = hash.clone();
            let expires_at = record.expires_at;
            tokio::spawn(async move {
                if let Err(e) = durable.record_touched(&hash, now, expires_at).await {
                    tracing::warn!(token_ref = %hash, error = %e, "Failed to archive token use");
                }
            });
        }

        Ok(outcome)
    }

    /// Compare-and-set revoke
    ///
    /// The archive receives the full revoked record as an upsert, so an
    /// issuance write still in flight cannot resurrect it. Unknown hashes
    /// get a tombstone so a later rehydrate cannot bring them back.
    pub async fn revoke(&self, hash: &TokenHash, now: DateTime<Utc>) -> AuthResult<RevokeOutcome> {
        let outcome = self.primary.revoke(hash, now).await?;

        let durable = self.durable.clone();
        match &outcome {
            RevokeOutcome::Revoked(record) => {
                let archived = record.clone();
                self.mirror("revoke", hash, async move {
                    durable.record_revoked(&archived).await
                })
                .await;
            }
            RevokeOutcome::NotFound => {
                let archived = hash.clone();
                self.mirror("tombstone", hash, async move {
                    durable.record_tombstone(&archived, now).await
                })
                .await;
            }
            RevokeOutcome::AlreadyRevoked => {}
        }

        Ok(outcome)
    }

    /// Revoke every live token of a principal
    ///
    /// Unions the durable scan with the primary per-principal index. Tokens
    /// issued while the sweep runs may survive it; the sweep duration is the
    /// bound on that window.
    pub async fn revoke_all_for_principal(
        &self,
        principal_id: &PrincipalId,
        now: DateTime<Utc>,
    ) -> AuthResult<SweepReport> {
        let started = Instant::now();

        let mut hashes: HashSet<TokenHash> = self
            .primary
            .hashes_for_principal(principal_id)
            .await?
            .into_iter()
            .collect();

        match self.durable.find_active_for_principal(principal_id, now).await {
            Ok(records) => hashes.extend(records.into_iter().map(|r| r.token_hash)),
            Err(e) => {
                tracing::warn!(
                    principal_id = %principal_id,
                    error = %e,
                    "Durable scan failed, sweeping primary index only"
                );
            }
        }

        let scanned = hashes.len() as u64;
        let mut revoked = 0u64;
        for hash in &hashes {
            if let RevokeOutcome::Revoked(_) = self.revoke(hash, now).await? {
                revoked += 1;
            }
        }

        let elapsed = started.elapsed();
        let deadline_exceeded = elapsed > self.config.revoke_all_deadline;
        if deadline_exceeded {
            tracing::warn!(
                principal_id = %principal_id,
                elapsed_ms = elapsed.as_millis() as u64,
                deadline_ms = self.config.revoke_all_deadline.as_millis() as u64,
                scanned,
                "Revoke-all sweep exceeded its deadline"
            );
        }

        Ok(SweepReport {
            revoked,
            scanned,
            elapsed,
            deadline_exceeded,
        })
    }

    /// Live records of a principal, from the archive
    pub async fn active_for_principal(
        &self,
        principal_id: &PrincipalId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<TokenRecord>> {
        self.durable.find_active_for_principal(principal_id, now).await
    }

    /// Refill the primary tier from the archive after a primary loss
    pub async fn rehydrate(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let records = self.durable.find_active(now).await?;
        let mut restored = 0u64;
        for record in &records {
            if self
                .primary
                .put_if_absent(record, self.evict_at(record.expires_at))
                .await?
            {
                restored += 1;
            }
        }

        tracing::info!(
            restored,
            archived = records.len(),
            "Primary token tier rehydrated"
        );
        Ok(restored)
    }

    /// Run a durable write on a detached task, waiting a bounded time
    async fn mirror<F>(&self, op: &'static str, hash: &TokenHash, write: F)
    where
        F: Future<Output = AuthResult<()>> + Send + 'static,
    {
        let handle = tokio::spawn(write);
        match tokio::time::timeout(self.config.durable_write_timeout, handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                tracing::warn!(op, token_ref = %hash, error = %e, "Durable tier write failed");
            }
            Ok(Err(e)) => {
                tracing::warn!(op, token_ref = %hash, error = %e, "Durable tier task failed");
            }
            Err(_) => {
                tracing::warn!(
                    op,
                    token_ref = %hash,
                    "Durable tier write still pending, continuing in background"
                );
            }
        }
    }
}
