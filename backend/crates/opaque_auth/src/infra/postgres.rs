//! PostgreSQL Repository Implementations
//!
//! Durable token archive, lockout counters, login attempt log and the
//! principal directory view.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use kernel::id::LoginAttemptId;

use crate::domain::entity::{
    FailureOutcome, LockoutState, LoginAttempt, LoginFailureReason, Principal, TokenRecord,
};
use crate::domain::policy::LockoutPolicy;
use crate::domain::repository::{
    DurableTokenTier, LockoutStore, LoginAttemptLog, PrincipalDirectory, PurgeCounts,
};
use crate::domain::value_object::{PrincipalId, PrincipalStatus, SessionKind, TokenHash};
use crate::error::{AuthError, AuthResult};

/// PostgreSQL-backed auth repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete login attempts older than `cutoff`
    pub async fn purge_login_attempts(&self, cutoff: DateTime<Utc>) -> AuthResult<u64> {
        let deleted = sqlx::query("DELETE FROM login_attempts WHERE occurred_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(attempts_deleted = deleted, "Cleaned up old login attempts");

        Ok(deleted)
    }
}

// ============================================================================
// Durable Token Tier Implementation
// ============================================================================

const TOKEN_COLUMNS: &str = r#"
    token_hash,
    principal_id,
    session_kind,
    session_label,
    created_at,
    expires_at,
    last_used_at,
    revoked,
    revoked_at,
    client_ip,
    user_agent
"#;

impl DurableTokenTier for PgAuthRepository {
    async fn record_issued(&self, record: &TokenRecord) -> AuthResult<()> {
        // A tombstone written before this insert turns it into a revoked row.
        sqlx::query(
            r#"
            INSERT INTO token_records (
                token_hash,
                principal_id,
                session_kind,
                session_label,
                created_at,
                expires_at,
                last_used_at,
                revoked,
                revoked_at,
                client_ip,
                user_agent
            )
            SELECT
                $1, $2, $3, $4, $5, $6, $7,
                $8 OR t.token_hash IS NOT NULL,
                COALESCE($9, t.revoked_at),
                $10, $11
            FROM (SELECT 1) AS issued
            LEFT JOIN token_tombstones t ON t.token_hash = $1
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(record.token_hash.as_str())
        .bind(record.principal_id.as_uuid())
        .bind(record.session_kind.code())
        .bind(record.session_kind.label())
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.last_used_at)
        .bind(record.revoked)
        .bind(record.revoked_at)
        .bind(&record.client_ip)
        .bind(&record.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_revoked(&self, record: &TokenRecord) -> AuthResult<()> {
        let revoked_at = record.revoked_at.unwrap_or(record.created_at);
        sqlx::query(
            r#"
            INSERT INTO token_records (
                token_hash,
                principal_id,
                session_kind,
                session_label,
                created_at,
                expires_at,
                last_used_at,
                revoked,
                revoked_at,
                client_ip,
                user_agent
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9, $10)
            ON CONFLICT (token_hash) DO UPDATE
            SET revoked = TRUE,
                revoked_at = COALESCE(token_records.revoked_at, EXCLUDED.revoked_at)
            "#,
        )
        .bind(record.token_hash.as_str())
        .bind(record.principal_id.as_uuid())
        .bind(record.session_kind.code())
        .bind(record.session_kind.label())
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.last_used_at)
        .bind(revoked_at)
        .bind(&record.client_ip)
        .bind(&record.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_tombstone(&self, hash: &TokenHash, revoked_at: DateTime<Utc>) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO token_tombstones (token_hash, revoked_at)
            VALUES ($1, $2)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(hash.as_str())
        .bind(revoked_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE token_records
            SET revoked = TRUE, revoked_at = $2
            WHERE token_hash = $1 AND NOT revoked
            "#,
        )
        .bind(hash.as_str())
        .bind(revoked_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_touched(
        &self,
        hash: &TokenHash,
        last_used_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE token_records
            SET last_used_at = $2, expires_at = GREATEST(expires_at, $3)
            WHERE token_hash = $1 AND NOT revoked
            "#,
        )
        .bind(hash.as_str())
        .bind(last_used_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_active_for_principal(
        &self,
        principal_id: &PrincipalId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<TokenRecord>> {
        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM token_records \
             WHERE principal_id = $1 AND NOT revoked AND expires_at >= $2 \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, TokenRecordRow>(&sql)
            .bind(principal_id.as_uuid())
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TokenRecordRow::into_record).collect()
    }

    async fn find_active(&self, now: DateTime<Utc>) -> AuthResult<Vec<TokenRecord>> {
        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM token_records WHERE NOT revoked AND expires_at >= $1"
        );
        let rows = sqlx::query_as::<_, TokenRecordRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TokenRecordRow::into_record).collect()
    }

    async fn purge(&self, cutoff: DateTime<Utc>) -> AuthResult<PurgeCounts> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query("DELETE FROM token_records WHERE revoked AND revoked_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let expired = sqlx::query("DELETE FROM token_records WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let tombstones = sqlx::query("DELETE FROM token_tombstones WHERE revoked_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(PurgeCounts {
            expired,
            revoked: revoked + tombstones,
        })
    }
}

// ============================================================================
// Lockout Store Implementation
// ============================================================================

impl LockoutStore for PgAuthRepository {
    async fn get(&self, principal_id: &PrincipalId) -> AuthResult<Option<LockoutState>> {
        let row = sqlx::query_as::<_, LockoutRow>(
            r#"
            SELECT principal_id, failed_attempts, lockout_expiry, lockout_count, updated_at
            FROM principal_lockouts
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LockoutRow::into_state))
    }

    /// Single UPDATE against the row locked by the sub-select, so concurrent
    /// failures serialize on the row and each sees the previous increment.
    async fn record_failure(
        &self,
        principal_id: &PrincipalId,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AuthResult<FailureOutcome> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO principal_lockouts (principal_id, failed_attempts, lockout_count, updated_at)
            VALUES ($1, 0, 0, $2)
            ON CONFLICT (principal_id) DO NOTHING
            "#,
        )
        .bind(principal_id.as_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, FailureRow>(
            r#"
            UPDATE principal_lockouts l
            SET
                failed_attempts = old.failed_attempts + 1,
                lockout_expiry = CASE
                    WHEN old.failed_attempts + 1 >= $3
                         AND (old.lockout_expiry IS NULL OR old.lockout_expiry <= $2)
                    THEN $2 + make_interval(secs => LEAST(
                        $4 * POWER($5, LEAST(old.failed_attempts + 1 - $3, 64)),
                        $6
                    ))
                    ELSE old.lockout_expiry
                END,
                lockout_count = CASE
                    WHEN old.failed_attempts + 1 >= $3
                         AND (old.lockout_expiry IS NULL OR old.lockout_expiry <= $2)
                    THEN old.lockout_count + 1
                    ELSE old.lockout_count
                END,
                updated_at = $2
            FROM (
                SELECT principal_id, failed_attempts, lockout_expiry, lockout_count
                FROM principal_lockouts
                WHERE principal_id = $1
                FOR UPDATE
            ) old
            WHERE l.principal_id = old.principal_id
            RETURNING
                l.principal_id,
                l.failed_attempts,
                l.lockout_expiry,
                l.lockout_count,
                l.updated_at,
                l.lockout_count <> old.lockout_count AS newly_locked
            "#,
        )
        .bind(principal_id.as_uuid())
        .bind(now)
        .bind(policy.threshold as i32)
        .bind(policy.base_duration.num_milliseconds() as f64 / 1000.0)
        .bind(policy.growth_factor)
        .bind(policy.max_duration.num_milliseconds() as f64 / 1000.0)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let newly_locked = row.newly_locked;
        let state = row.into_state();
        let locked_until = if newly_locked {
            state.lockout_expiry
        } else {
            None
        };

        Ok(FailureOutcome {
            state,
            locked_until,
        })
    }

    async fn reset(
        &self,
        principal_id: &PrincipalId,
        _now: DateTime<Utc>,
    ) -> AuthResult<Option<LockoutState>> {
        let row = sqlx::query_as::<_, LockoutRow>(
            r#"
            DELETE FROM principal_lockouts
            WHERE principal_id = $1
            RETURNING principal_id, failed_attempts, lockout_expiry, lockout_count, updated_at
            "#,
        )
        .bind(principal_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LockoutRow::into_state))
    }
}

// ============================================================================
// Login Attempt Log Implementation
// ============================================================================

impl LoginAttemptLog for PgAuthRepository {
    async fn append(&self, attempt: &LoginAttempt) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (
                attempt_id,
                principal_id,
                email,
                success,
                failure_reason,
                client_ip,
                user_agent,
                occurred_at,
                correlation_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(attempt.id.as_uuid())
        .bind(attempt.principal_id.map(|id| id.into_uuid()))
        .bind(&attempt.email)
        .bind(attempt.success)
        .bind(attempt.failure_reason.map(|r| r.code()))
        .bind(&attempt.client_ip)
        .bind(&attempt.user_agent)
        .bind(attempt.occurred_at)
        .bind(&attempt.correlation_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_for_principal(
        &self,
        principal_id: &PrincipalId,
        limit: usize,
    ) -> AuthResult<Vec<LoginAttempt>> {
        let rows = sqlx::query_as::<_, LoginAttemptRow>(
            r#"
            SELECT
                attempt_id,
                principal_id,
                email,
                success,
                failure_reason,
                client_ip,
                user_agent,
                occurred_at,
                correlation_id
            FROM login_attempts
            WHERE principal_id = $1
            ORDER BY occurred_at DESC
            LIMIT $2
            "#,
        )
        .bind(principal_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LoginAttemptRow::into_attempt).collect()
    }
}

// ============================================================================
// Principal Directory Implementation
// ============================================================================

impl PrincipalDirectory for PgAuthRepository {
    async fn find(&self, principal_id: &PrincipalId) -> AuthResult<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT
                principal_id,
                status,
                deleted_at IS NOT NULL AS deleted,
                lockout_expiry
            FROM principals
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PrincipalRow::into_principal).transpose()
    }
}

// ============================================================================
// Row Types for sqlx mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct TokenRecordRow {
    token_hash: String,
    principal_id: Uuid,
    session_kind: String,
    session_label: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
    revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
    client_ip: Option<String>,
    user_agent: Option<String>,
}

impl TokenRecordRow {
    fn into_record(self) -> AuthResult<TokenRecord> {
        let token_hash = TokenHash::parse(self.token_hash)
            .map_err(|e| AuthError::Internal(format!("Invalid token_hash: {}", e)))?;
        let session_kind = SessionKind::from_parts(&self.session_kind, self.session_label)
            .ok_or_else(|| {
                AuthError::Internal(format!("Invalid session_kind: {}", self.session_kind))
            })?;

        Ok(TokenRecord {
            token_hash,
            principal_id: PrincipalId::from_uuid(self.principal_id),
            session_kind,
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
            revoked: self.revoked,
            revoked_at: self.revoked_at,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LockoutRow {
    principal_id: Uuid,
    failed_attempts: i32,
    lockout_expiry: Option<DateTime<Utc>>,
    lockout_count: i32,
    updated_at: DateTime<Utc>,
}

impl LockoutRow {
    fn into_state(self) -> LockoutState {
        LockoutState {
            principal_id: PrincipalId::from_uuid(self.principal_id),
            failed_attempts: self.failed_attempts.max(0) as u32,
            lockout_expiry: self.lockout_expiry,
            lockout_count: self.lockout_count.max(0) as u32,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FailureRow {
    #[sqlx(flatten)]
    state: LockoutRow,
    newly_locked: bool,
}

impl FailureRow {
    fn into_state(self) -> LockoutState {
        self.state.into_state()
    }
}

#[derive(sqlx::FromRow)]
struct LoginAttemptRow {
    attempt_id: Uuid,
    principal_id: Option<Uuid>,
    email: String,
    success: bool,
    failure_reason: Option<String>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    occurred_at: DateTime<Utc>,
    correlation_id: String,
}

impl LoginAttemptRow {
    fn into_attempt(self) -> AuthResult<LoginAttempt> {
        let failure_reason = self
            .failure_reason
            .map(|code| {
                LoginFailureReason::from_code(&code)
                    .ok_or_else(|| AuthError::Internal(format!("Invalid failure_reason: {}", code)))
            })
            .transpose()?;

        Ok(LoginAttempt {
            id: LoginAttemptId::from_uuid(self.attempt_id),
            principal_id: self.principal_id.map(PrincipalId::from_uuid),
            email: self.email,
            success: self.success,
            failure_reason,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            occurred_at: self.occurred_at,
            correlation_id: self.correlation_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    principal_id: Uuid,
    status: i16,
    deleted: bool,
    lockout_expiry: Option<DateTime<Utc>>,
}

impl PrincipalRow {
    fn into_principal(self) -> AuthResult<Principal> {
        let status = PrincipalStatus::from_id(self.status)
            .ok_or_else(|| AuthError::Internal(format!("Invalid principal status: {}", self.status)))?;

        Ok(Principal {
            id: PrincipalId::from_uuid(self.principal_id),
            status,
            deleted: self.deleted,
            lockout_expiry: self.lockout_expiry,
        })
    }
}
