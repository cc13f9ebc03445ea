//! Token Retention Job
//!
//! Deletes token records that expired or were revoked longer ago than the
//! retention period. Login attempts are purged only when
//! `LOGIN_ATTEMPT_RETENTION_DAYS` is set, since their retention belongs to
//! the surrounding compliance policy. Meant to run from an external
//! scheduler; one pass per invocation.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use opaque_auth::application::RetentionJob;
use opaque_auth::infra::TracingAuditSink;
use opaque_auth::{EngineConfig, PgAuthRepository};
use platform::client::RequestContext;
use platform::clock::{Clock, SystemClock};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retention=info,opaque_auth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let mut config = EngineConfig::default();
    if let Some(period) = retention_period(
        "TOKEN_RETENTION_DAYS",
        env::var("TOKEN_RETENTION_DAYS").ok().as_deref(),
    )? {
        config.retention_period = period;
    }
    config.validate()?;
    let attempt_retention = retention_period(
        "LOGIN_ATTEMPT_RETENTION_DAYS",
        env::var("LOGIN_ATTEMPT_RETENTION_DAYS").ok().as_deref(),
    )?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    let repo = Arc::new(PgAuthRepository::new(pool));
    let clock = Arc::new(SystemClock);
    let job = RetentionJob::new(
        repo.clone(),
        Arc::new(TracingAuditSink),
        clock.clone(),
        Arc::new(config.clone()),
    );

    let report = job.purge(&RequestContext::system()).await?;
    tracing::info!(
        cutoff = %report.cutoff,
        expired = report.expired,
        revoked = report.revoked,
        "Token retention pass completed"
    );

    let Some(attempt_retention) = attempt_retention else {
        tracing::info!("LOGIN_ATTEMPT_RETENTION_DAYS unset, keeping login attempts");
        return Ok(());
    };

    // Errors here should not fail the token pass that already committed
    let cutoff = chrono::Duration::from_std(attempt_retention)
        .ok()
        .and_then(|period| clock.now().checked_sub_signed(period))
        .context("LOGIN_ATTEMPT_RETENTION_DAYS is out of range")?;
    if let Err(e) = repo.purge_login_attempts(cutoff).await {
        tracing::warn!(error = %e, "Login attempt purge failed");
    }

    Ok(())
}

/// Parse a whole-day retention setting; None when unset
fn retention_period(name: &str, value: Option<&str>) -> anyhow::Result<Option<Duration>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let days: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{name} is not a number: {value}"))?;
    let secs = days
        .checked_mul(24 * 3600)
        .with_context(|| format!("{name} is too large: {days}"))?;
    Ok(Some(Duration::from_secs(secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_retention_is_none() {
        assert!(retention_period("X", None).unwrap().is_none());
    }

    #[test]
    fn test_retention_days_to_duration() {
        assert_eq!(
            retention_period("X", Some("30")).unwrap(),
            Some(Duration::from_secs(30 * 24 * 3600))
        );
    }

    #[test]
    fn test_huge_retention_is_rejected() {
        let err = retention_period("TOKEN_RETENTION_DAYS", Some(&u64::MAX.to_string())).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_non_numeric_retention_is_rejected() {
        assert!(retention_period("X", Some("thirty")).is_err());
    }
}
