//! End-to-end tests for the auth engine over in-memory stores

#[cfg(test)]
mod engine_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;
    use platform::client::RequestContext;
    use platform::clock::{Clock, ManualClock};
    use platform::rate_limit::RateLimitResult;
    use tokio_test::{assert_err, assert_ok};

    use crate::application::{IssuedToken, LockoutDecision, LoginRequest, RevocationReason};
    use crate::domain::audit::{AuditEventType, AuditOutcome};
    use crate::domain::entity::LoginFailureReason;
    use crate::domain::value_object::{PrincipalId, PrincipalStatus, SessionKind};
    use crate::infra::audit::MemoryAuditSink;
    use crate::infra::memory::{
        InMemoryLockoutStore, InMemoryLoginAttemptLog, InMemoryPrincipalDirectory,
        InMemoryTokenArchive, InMemoryTokenTier,
    };
    use crate::{AuthEngine, AuthError, EngineConfig, EngineStores};

    type MemoryEngine = AuthEngine<
        InMemoryTokenTier,
        InMemoryTokenArchive,
        InMemoryLockoutStore,
        InMemoryLoginAttemptLog,
        InMemoryPrincipalDirectory,
    >;

    struct Harness {
        engine: Arc<MemoryEngine>,
        primary: Arc<InMemoryTokenTier>,
        archive: Arc<InMemoryTokenArchive>,
        lockouts: Arc<InMemoryLockoutStore>,
        attempts: Arc<InMemoryLoginAttemptLog>,
        directory: Arc<InMemoryPrincipalDirectory>,
        audit: Arc<MemoryAuditSink>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        harness_with(EngineConfig::default(), InMemoryTokenArchive::new())
    }

    fn harness_with(config: EngineConfig, archive: InMemoryTokenArchive) -> Harness {
        let primary = Arc::new(InMemoryTokenTier::new());
        let archive = Arc::new(archive);
        let lockouts = Arc::new(InMemoryLockoutStore::new());
        let attempts = Arc::new(InMemoryLoginAttemptLog::new());
        let directory = Arc::new(InMemoryPrincipalDirectory::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::default());

        let engine = AuthEngine::new(
            EngineStores {
                primary: primary.clone(),
                durable: archive.clone(),
                lockouts: lockouts.clone(),
                attempts: attempts.clone(),
                directory: directory.clone(),
            },
            audit.clone(),
            clock.clone(),
            config,
        )
        .unwrap();

        Harness {
            engine: Arc::new(engine),
            primary,
            archive,
            lockouts,
            attempts,
            directory,
            audit,
            clock,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(
            Some("req-e2e"),
            Some("203.0.113.7".parse().unwrap()),
            Some("Mozilla/5.0 Test"),
        )
    }

    fn login(principal_id: Option<PrincipalId>, credentials_valid: bool) -> LoginRequest {
        LoginRequest {
            principal_id,
            email: "user@example.com".to_string(),
            credentials_valid,
            rate_limit: None,
            session_kind: SessionKind::Web,
        }
    }

    async fn issue_web(h: &Harness, principal_id: PrincipalId) -> IssuedToken {
        h.engine
            .issuer()
            .issue(principal_id, SessionKind::Web, &ctx())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_issue_then_validate_returns_principal() {
        let h = harness();
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;

        let token = issued.token.expose();
        assert_eq!(token.len(), 43);
        assert!(!token.contains('='));

        let session = h.engine.validator().validate(token, &ctx()).await.unwrap();
        assert_eq!(session.principal_id, u1);
        assert_eq!(session.expires_at, h.clock.now() + ChronoDuration::hours(24));
        assert_eq!(h.audit.count(AuditEventType::TokenIssued), 1);
        assert_eq!(h.audit.count(AuditEventType::TokenValidated), 1);
    }

    #[tokio::test]
    async fn test_sliding_expiration() {
        let h = harness();
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;
        let token = issued.token.expose();
        let t0 = h.clock.now();

        h.clock.advance(ChronoDuration::hours(23));
        let session = h.engine.validator().validate(token, &ctx()).await.unwrap();
        assert_eq!(session.expires_at, t0 + ChronoDuration::hours(47));

        h.clock.advance(ChronoDuration::hours(24) + ChronoDuration::seconds(1));
        let err = h.engine.validator().validate(token, &ctx()).await.unwrap_err();
        assert!(matches!(err, AuthError::ExpiredToken));
    }

    #[tokio::test]
    async fn test_unused_token_expires_after_window() {
        let h = harness();
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;

        h.clock.advance(ChronoDuration::hours(24) + ChronoDuration::seconds(1));
        let err = h
            .engine
            .validator()
            .validate(issued.token.expose(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ExpiredToken));

        // Past the grace period the record is gone from the primary tier.
        h.clock.advance(ChronoDuration::hours(2));
        let err = h
            .engine
            .validator()
            .validate(issued.token.expose(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let h = harness();
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;
        let token = issued.token.expose();

        assert!(h.engine.revocation().revoke_presented(token, &ctx()).await.unwrap());
        assert!(!h.engine.revocation().revoke_presented(token, &ctx()).await.unwrap());
        assert_eq!(h.audit.count(AuditEventType::TokenRevoked), 1);

        let err = h.engine.validator().validate(token, &ctx()).await.unwrap_err();
        assert!(matches!(err, AuthError::RevokedToken));

        let archived = h.archive.find(&issued.record.token_hash).unwrap();
        assert!(archived.revoked);
        assert!(archived.revoked_at.is_some());
    }

    #[tokio::test]
    async fn test_revoking_unknown_token_is_a_noop() {
        let h = harness();
        let revoked = assert_ok!(
            h.engine
                .revocation()
                .revoke_presented("never-issued", &ctx())
                .await
        );
        assert!(!revoked);
        assert_eq!(h.audit.count(AuditEventType::TokenRevoked), 0);
    }

    #[tokio::test]
    async fn test_session_survives_lockout_by_default() {
        let h = harness();
        let u1 = h.directory.add_active();

        let first = issue_web(&h, u1).await;
        let session = h
            .engine
            .validator()
            .validate(first.token.expose(), &ctx())
            .await
            .unwrap();
        assert_eq!(session.principal_id, u1);

        h.engine
            .revocation()
            .revoke_presented(first.token.expose(), &ctx())
            .await
            .unwrap();
        let err = h
            .engine
            .validator()
            .validate(first.token.expose(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RevokedToken));

        let second = issue_web(&h, u1).await;
        for _ in 0..5 {
            let err = h
                .engine
                .authenticator()
                .authenticate(login(Some(u1), false), &ctx())
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }

        assert_eq!(
            h.engine.lockout().check_allowed(&u1).await.unwrap(),
            LockoutDecision::Locked {
                retry_after: Duration::from_secs(1800)
            }
        );
        assert!(h.engine.validator().is_valid(second.token.expose(), &ctx()).await);
    }

    #[tokio::test]
    async fn test_lockout_revokes_sessions_when_configured() {
        let config = EngineConfig {
            revoke_sessions_on_lockout: true,
            ..EngineConfig::default()
        };
        let h = harness_with(config, InMemoryTokenArchive::new());
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;

        for _ in 0..5 {
            let _ = h
                .engine
                .authenticator()
                .authenticate(login(Some(u1), false), &ctx())
                .await;
        }

        let err = h
            .engine
            .validator()
            .validate(issued.token.expose(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RevokedToken));

        let bulk = h.audit.of_type(AuditEventType::TokensRevokedForPrincipal);
        assert_eq!(bulk.len(), 1);
        assert_eq!(bulk[0].count, Some(1));
        assert_eq!(bulk[0].reason.as_deref(), Some("account_locked"));
    }

    #[tokio::test]
    async fn test_lockout_escalation() {
        let h = harness();
        let u1 = h.directory.add_active();
        let lockout = h.engine.lockout();

        for _ in 0..5 {
            lockout.record_failure(&u1, &ctx()).await.unwrap();
        }
        let LockoutDecision::Locked { retry_after } = lockout.check_allowed(&u1).await.unwrap()
        else {
            panic!("expected lockout after five failures");
        };
        assert_eq!(retry_after, Duration::from_secs(1800));

        // A failure during the lockout does not shorten it.
        h.clock.advance(ChronoDuration::minutes(10));
        let outcome = lockout.record_failure(&u1, &ctx()).await.unwrap();
        assert!(outcome.locked_until.is_none());
        assert_eq!(
            lockout.check_allowed(&u1).await.unwrap(),
            LockoutDecision::Locked {
                retry_after: Duration::from_secs(1200)
            }
        );

        // The counter kept running during the lockout, so the 7th failure
        // is the third breach: 30 min doubled twice.
        h.clock.advance(ChronoDuration::minutes(21));
        assert!(lockout.check_allowed(&u1).await.unwrap().is_allowed());
        let outcome = lockout.record_failure(&u1, &ctx()).await.unwrap();
        assert_eq!(
            outcome.locked_until,
            Some(h.clock.now() + ChronoDuration::minutes(120))
        );
        assert_eq!(outcome.state.lockout_count, 2);
        assert_eq!(h.audit.count(AuditEventType::AccountLocked), 2);

        // Success after expiry resets the counter.
        h.clock.advance(ChronoDuration::minutes(121));
        h.engine
            .authenticator()
            .authenticate(login(Some(u1), true), &ctx())
            .await
            .unwrap();
        assert_eq!(lockout.failed_attempts(&u1).await.unwrap(), 0);
        assert_eq!(h.audit.count(AuditEventType::AccountUnlocked), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_lock_exactly_once() {
        let h = harness();
        let u1 = h.directory.add_active();

        let mut handles = Vec::with_capacity(100);
        for _ in 0..100 {
            let engine = h.engine.clone();
            handles.push(tokio::spawn(async move {
                engine.lockout().record_failure(&u1, &ctx()).await
            }));
        }
        let mut locks = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().locked_until.is_some() {
                locks += 1;
            }
        }

        assert_eq!(locks, 1);
        assert_eq!(h.audit.count(AuditEventType::AccountLocked), 1);
        assert_eq!(h.audit.count(AuditEventType::LoginFailed), 100);
        assert_eq!(h.engine.lockout().failed_attempts(&u1).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_revoke_all_then_validate_fails() {
        let h = harness();
        let u1 = h.directory.add_active();
        let other = h.directory.add_active();

        let mut tokens = Vec::new();
        for _ in 0..3 {
            tokens.push(issue_web(&h, u1).await);
        }
        let survivor = issue_web(&h, other).await;

        let revoked = h
            .engine
            .revocation()
            .revoke_all_for_principal(&u1, RevocationReason::LogoutEverywhere, &ctx())
            .await
            .unwrap();
        assert_eq!(revoked, 3);

        for issued in &tokens {
            let err = h
                .engine
                .validator()
                .validate(issued.token.expose(), &ctx())
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::RevokedToken));
        }
        assert!(h.engine.validator().is_valid(survivor.token.expose(), &ctx()).await);

        let bulk = h.audit.of_type(AuditEventType::TokensRevokedForPrincipal);
        assert_eq!(bulk.len(), 1);
        assert_eq!(bulk[0].count, Some(3));
        assert_eq!(h.audit.count(AuditEventType::TokenRevoked), 0);
    }

    #[tokio::test]
    async fn test_revoke_all_reports_deadline_overrun() {
        let config = EngineConfig {
            revoke_all_deadline: Duration::from_millis(1),
            ..EngineConfig::default()
        };
        let h = harness_with(config, InMemoryTokenArchive::with_latency(Duration::from_millis(20)));
        let u1 = h.directory.add_active();
        issue_web(&h, u1).await;

        let report = h
            .engine
            .store()
            .revoke_all_for_principal(&u1, h.clock.now())
            .await
            .unwrap();
        assert_eq!(report.revoked, 1);
        assert_eq!(report.scanned, 1);
        assert!(report.deadline_exceeded);
    }

    #[tokio::test]
    async fn test_revoke_all_falls_back_to_primary_index() {
        let h = harness();
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;

        h.archive.set_failing(true);
        let report = assert_ok!(
            h.engine
                .store()
                .revoke_all_for_principal(&u1, h.clock.now())
                .await
        );
        assert_eq!(report.revoked, 1);
        assert!(!h.engine.validator().is_valid(issued.token.expose(), &ctx()).await);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness();
        let known = h.directory.add_active();
        let disabled = h.directory.add_active();
        h.directory.set_status(&disabled, PrincipalStatus::Disabled);

        let unknown_err = h
            .engine
            .authenticator()
            .authenticate(login(None, true), &ctx())
            .await
            .unwrap_err();
        let wrong_err = h
            .engine
            .authenticator()
            .authenticate(login(Some(known), false), &ctx())
            .await
            .unwrap_err();
        let disabled_err = h
            .engine
            .authenticator()
            .authenticate(login(Some(disabled), true), &ctx())
            .await
            .unwrap_err();

        let responses: Vec<_> = [unknown_err, wrong_err, disabled_err]
            .iter()
            .map(|e| {
                let app = e.to_app_error();
                (app.status_code(), app.message().to_string())
            })
            .collect();
        assert!(responses.iter().all(|r| r == &responses[0]));
        assert_eq!(responses[0].0, 401);

        // Internally the three reasons stay distinct.
        let reasons: Vec<_> = h
            .attempts
            .all()
            .iter()
            .map(|a| a.failure_reason)
            .collect();
        assert_eq!(
            reasons,
            vec![
                Some(LoginFailureReason::UnknownPrincipal),
                Some(LoginFailureReason::InvalidCredentials),
                Some(LoginFailureReason::AccountDisabled),
            ]
        );
    }

    #[tokio::test]
    async fn test_login_failure_paths_do_equal_store_work() {
        let h = harness();
        let known = h.directory.add_active();
        let disabled = h.directory.add_active();
        h.directory.set_status(&disabled, PrincipalStatus::Disabled);

        let requests = [
            login(None, true),
            login(Some(PrincipalId::new()), true),
            login(Some(known), false),
            login(Some(disabled), true),
        ];

        let mut costs = Vec::new();
        for request in requests {
            let lookups = h.directory.lookups();
            let (reads, writes) = h.lockouts.operation_counts();
            let appended = h.attempts.all().len();

            assert_err!(h.engine.authenticator().authenticate(request, &ctx()).await);

            let (reads_after, writes_after) = h.lockouts.operation_counts();
            costs.push((
                h.directory.lookups() - lookups,
                reads_after - reads,
                writes_after - writes,
                h.attempts.all().len() - appended,
            ));
        }

        assert_eq!(costs[0], (1, 1, 1, 1));
        assert!(costs.iter().all(|c| c == &costs[0]), "{costs:?}");
    }

    #[tokio::test]
    async fn test_unknown_and_orphaned_tokens_are_indistinguishable() {
        let h = harness();
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;
        h.directory.remove(&u1);

        let orphaned = h
            .engine
            .validator()
            .validate(issued.token.expose(), &ctx())
            .await
            .unwrap_err();
        let unknown = h
            .engine
            .validator()
            .validate("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", &ctx())
            .await
            .unwrap_err();

        assert_eq!(orphaned.to_string(), unknown.to_string());
        assert_eq!(orphaned.kind(), unknown.kind());
    }

    #[tokio::test]
    async fn test_rate_limit_rejection_propagates() {
        let h = harness();
        let u1 = h.directory.add_active();
        let now = h.clock.now();
        let request = LoginRequest {
            rate_limit: Some(RateLimitResult::rejected(now + ChronoDuration::seconds(30))),
            ..login(Some(u1), true)
        };

        let err = h
            .engine
            .authenticator()
            .authenticate(request, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));

        // Rejected before the credential check: no lockout accounting.
        assert_eq!(h.engine.lockout().failed_attempts(&u1).await.unwrap(), 0);
        let failed = h.audit.of_type(AuditEventType::LoginFailed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].reason.as_deref(), Some("rate_limited"));
    }

    #[tokio::test]
    async fn test_locked_login_is_rejected_with_retry_after() {
        let h = harness();
        let u1 = h.directory.add_active();
        for _ in 0..5 {
            let _ = h
                .engine
                .authenticator()
                .authenticate(login(Some(u1), false), &ctx())
                .await;
        }

        // Even correct credentials are refused while locked.
        let err = h
            .engine
            .authenticator()
            .authenticate(login(Some(u1), true), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserLockedOut { .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(1800)));
        assert_eq!(h.engine.lockout().failed_attempts(&u1).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_successful_login_issues_token() {
        let h = harness();
        let u1 = h.directory.add_active();

        let issued = h
            .engine
            .authenticator()
            .authenticate(login(Some(u1), true), &ctx())
            .await
            .unwrap();
        assert_eq!(issued.record.principal_id, u1);
        assert_eq!(issued.record.client_ip.as_deref(), Some("203.0.113.7"));

        let succeeded = h.audit.of_type(AuditEventType::LoginSucceeded);
        assert_eq!(succeeded.len(), 1);
        assert_eq!(succeeded[0].outcome, AuditOutcome::Success);
        assert_eq!(succeeded[0].token_ref.as_deref(), Some(issued.record.token_hash.short_ref()));

        let attempts = h.attempts.all();
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].success);
        assert_eq!(attempts[0].correlation_id, "req-e2e");
    }

    #[tokio::test]
    async fn test_primary_outage_fails_closed() {
        let h = harness();
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;

        h.primary.set_available(false);
        let err = assert_err!(
            h.engine
                .validator()
                .validate(issued.token.expose(), &ctx())
                .await
        );
        assert!(matches!(err, AuthError::StoreUnavailable(_)));
        assert_eq!(err.to_app_error().status_code(), 503);

        let rejected = h.audit.of_type(AuditEventType::TokenRejected);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].reason.as_deref(), Some("store_unavailable"));

        let issue_err = h
            .engine
            .issuer()
            .issue(u1, SessionKind::Web, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(issue_err, AuthError::StoreUnavailable(_)));

        h.primary.set_available(true);
        assert!(h.engine.validator().is_valid(issued.token.expose(), &ctx()).await);
    }

    #[tokio::test]
    async fn test_slow_archive_does_not_delay_validation() {
        let config = EngineConfig {
            durable_write_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        };
        let h = harness_with(config, InMemoryTokenArchive::with_latency(Duration::from_millis(400)));
        let u1 = h.directory.add_active();

        let started = tokio::time::Instant::now();
        let issued = issue_web(&h, u1).await;
        assert!(started.elapsed() < Duration::from_millis(300));

        let started = tokio::time::Instant::now();
        h.engine
            .validator()
            .validate(issued.token.expose(), &ctx())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_archive_outage_does_not_block_issuance() {
        let h = harness();
        let u1 = h.directory.add_active();
        h.archive.set_failing(true);

        let issued = issue_web(&h, u1).await;
        assert!(h.engine.validator().is_valid(issued.token.expose(), &ctx()).await);
        assert!(h.archive.is_empty());
    }

    #[tokio::test]
    async fn test_session_listing_and_token_info() {
        let h = harness();
        let u1 = h.directory.add_active();
        let web = issue_web(&h, u1).await;
        h.clock.advance(ChronoDuration::minutes(1));
        let api = h
            .engine
            .issuer()
            .issue(
                u1,
                SessionKind::Api {
                    name: "ci-deploy".into(),
                },
                &ctx(),
            )
            .await
            .unwrap();

        let sessions = h
            .engine
            .sessions()
            .list_sessions(&u1, Some(&web.record.token_hash))
            .await
            .unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].token_ref, api.record.token_hash.short_ref());
        assert!(!sessions[0].is_current);
        assert!(sessions[1].is_current);
        assert_eq!(h.engine.sessions().count_active_sessions(&u1).await.unwrap(), 2);

        let info = h
            .engine
            .sessions()
            .token_info(api.token.expose())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.principal_id, u1);
        assert_eq!(info.session_kind.label(), Some("ci-deploy"));
        assert!(!info.revoked);
        assert!(!info.expired);
        assert!(info.last_used_at.is_none());

        h.engine
            .revocation()
            .revoke_presented(web.token.expose(), &ctx())
            .await
            .unwrap();
        assert_eq!(h.engine.sessions().count_active_sessions(&u1).await.unwrap(), 1);
        let info = h
            .engine
            .sessions()
            .token_info(web.token.expose())
            .await
            .unwrap()
            .unwrap();
        assert!(info.revoked);

        assert!(h.engine.sessions().token_info("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rehydrate_after_primary_loss() {
        let h = harness();
        let u1 = h.directory.add_active();
        let live = issue_web(&h, u1).await;
        let revoked = issue_web(&h, u1).await;
        h.engine
            .revocation()
            .revoke_presented(revoked.token.expose(), &ctx())
            .await
            .unwrap();

        h.primary.clear();
        assert!(!h.engine.validator().is_valid(live.token.expose(), &ctx()).await);

        let restored = h.engine.store().rehydrate(h.clock.now()).await.unwrap();
        assert_eq!(restored, 1);
        assert!(h.engine.validator().is_valid(live.token.expose(), &ctx()).await);
        assert!(!h.engine.validator().is_valid(revoked.token.expose(), &ctx()).await);
    }

    #[tokio::test]
    async fn test_revocation_survives_late_archive_issuance() {
        let config = EngineConfig {
            durable_write_timeout: Duration::from_millis(5),
            ..EngineConfig::default()
        };
        let h = harness_with(
            config,
            InMemoryTokenArchive::with_issue_latency(Duration::from_millis(100)),
        );
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;

        assert!(h
            .engine
            .revocation()
            .revoke_presented(issued.token.expose(), &ctx())
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(200)).await;

        let archived = h.archive.find(&issued.record.token_hash).unwrap();
        assert!(archived.revoked);

        h.primary.clear();
        let restored = h.engine.store().rehydrate(h.clock.now()).await.unwrap();
        assert_eq!(restored, 0);
        assert!(!h.engine.validator().is_valid(issued.token.expose(), &ctx()).await);
    }

    #[tokio::test]
    async fn test_revoke_after_primary_loss_blocks_rehydrate() {
        let config = EngineConfig {
            durable_write_timeout: Duration::from_millis(5),
            ..EngineConfig::default()
        };
        let h = harness_with(
            config,
            InMemoryTokenArchive::with_issue_latency(Duration::from_millis(100)),
        );
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;

        // Primary lost before the archive saw the issuance.
        h.primary.clear();
        assert!(!h
            .engine
            .revocation()
            .revoke_presented(issued.token.expose(), &ctx())
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(h.engine.store().rehydrate(h.clock.now()).await.unwrap(), 0);
        assert!(!h.engine.validator().is_valid(issued.token.expose(), &ctx()).await);
    }

    #[tokio::test]
    async fn test_admin_unlock_restores_access() {
        let h = harness();
        let u1 = h.directory.add_active();
        for _ in 0..5 {
            h.engine.lockout().record_failure(&u1, &ctx()).await.unwrap();
        }

        assert!(h.engine.lockout().unlock(&u1, &RequestContext::system()).await.unwrap());
        assert!(h.engine.lockout().check_allowed(&u1).await.unwrap().is_allowed());

        let unlocked = h.audit.of_type(AuditEventType::AccountUnlocked);
        assert_eq!(unlocked.len(), 1);
        assert_eq!(unlocked[0].reason.as_deref(), Some("administrative"));
        assert_eq!(unlocked[0].user_agent.as_deref(), Some("system"));
    }

    #[tokio::test]
    async fn test_audit_trail_never_leaks_token_material() {
        let h = harness();
        let u1 = h.directory.add_active();
        let issued = issue_web(&h, u1).await;
        let token = issued.token.expose().to_string();
        let full_hash = issued.record.token_hash.as_str().to_string();

        h.engine.validator().validate(&token, &ctx()).await.unwrap();
        h.engine.revocation().revoke_presented(&token, &ctx()).await.unwrap();
        let _ = h.engine.validator().validate(&token, &ctx()).await;

        let events = h.audit.events();
        assert!(events.len() >= 4);
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            assert!(!json.contains(&token));
            assert!(!json.contains(&full_hash));
            assert_eq!(event.correlation_id, "req-e2e");
        }
        assert!(!format!("{issued:?}").contains(&token));
    }
}
