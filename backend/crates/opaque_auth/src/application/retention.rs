//! Retention Purge
//!
//! Physically deletes archived tokens 30 days (configurable) after expiry
//! or revocation. Runs on an external schedule.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use platform::client::RequestContext;
use platform::clock::Clock;

use crate::application::config::EngineConfig;
use crate::domain::audit::{AuditEvent, AuditEventType, AuditOutcome, AuditSink};
use crate::domain::repository::DurableTokenTier;
use crate::error::AuthResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub cutoff: DateTime<Utc>,
    pub expired: u64,
    pub revoked: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.expired + self.revoked
    }
}

pub struct RetentionJob<D> {
    durable: Arc<D>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl<D> RetentionJob<D>
where
    D: DurableTokenTier + Send + Sync + 'static,
{
    pub fn new(
        durable: Arc<D>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            durable,
            audit,
            clock,
            config,
        }
    }

    pub async fn purge(&self, ctx: &RequestContext) -> AuthResult<PurgeReport> {
        let now = self.clock.now();
        let cutoff = now - self.config.retention_chrono();
        let counts = self.durable.purge(cutoff).await?;

        let report = PurgeReport {
            cutoff,
            expired: counts.expired,
            revoked: counts.revoked,
        };
        tracing::info!(
            cutoff = %cutoff,
            expired = report.expired,
            revoked = report.revoked,
            "Purged archived tokens past retention"
        );
        self.audit.emit(
            AuditEvent::new(AuditEventType::TokensPurged, AuditOutcome::Success, ctx, now)
                .count(report.total()),
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::TokenRecord;
    use crate::domain::services::TokenCodec;
    use crate::domain::value_object::{PrincipalId, SessionKind};
    use crate::infra::audit::MemoryAuditSink;
    use crate::infra::memory::InMemoryTokenArchive;
    use chrono::Duration;
    use platform::clock::ManualClock;

    #[tokio::test]
    async fn test_purges_only_past_retention() {
        let archive = Arc::new(InMemoryTokenArchive::new());
        let clock = Arc::new(ManualClock::default());
        let audit = Arc::new(MemoryAuditSink::new());
        let start = clock.now();

        for _ in 0..3 {
            let (_, hash) = TokenCodec::issue();
            let record = TokenRecord::issue(
                hash,
                PrincipalId::new(),
                SessionKind::Web,
                start,
                Duration::hours(24),
                None,
                None,
            )
            .unwrap();
            archive.record_issued(&record).await.unwrap();
        }

        let job = RetentionJob::new(
            archive.clone(),
            audit.clone(),
            clock.clone(),
            Arc::new(EngineConfig::default()),
        );

        // Expired a day ago: still inside retention
        clock.advance(Duration::days(2));
        let report = job.purge(&RequestContext::system()).await.unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(archive.len(), 3);

        // expires_at + 30d has passed
        clock.advance(Duration::days(30));
        let report = job.purge(&RequestContext::system()).await.unwrap();
        assert_eq!(report.expired, 3);
        assert!(archive.is_empty());

        let purged = audit.of_type(AuditEventType::TokensPurged);
        assert_eq!(purged.len(), 2);
        assert_eq!(purged[1].count, Some(3));
    }
}
