//! Engine Facade
//!
//! Wires the components over one set of stores, one audit sink and one
//! clock.

use std::sync::Arc;

use platform::clock::Clock;

use crate::application::authenticator::Authenticator;
use crate::application::config::EngineConfig;
use crate::application::issuer::TokenIssuer;
use crate::application::lockout_guard::LockoutGuard;
use crate::application::revocation::RevocationManager;
use crate::application::session_query::SessionQueries;
use crate::application::session_validator::SessionValidator;
use crate::application::token_store::TokenStore;
use crate::domain::audit::AuditSink;
use crate::domain::repository::{
    DurableTokenTier, LockoutStore, LoginAttemptLog, PrimaryTokenTier, PrincipalDirectory,
};
use crate::error::AuthResult;

/// Backing stores of an engine
pub struct EngineStores<P, D, L, A, R> {
    pub primary: Arc<P>,
    pub durable: Arc<D>,
    pub lockouts: Arc<L>,
    pub attempts: Arc<A>,
    pub directory: Arc<R>,
}

pub struct AuthEngine<P, D, L, A, R> {
    store: TokenStore<P, D>,
    issuer: Arc<TokenIssuer<P, D>>,
    validator: SessionValidator<P, D, R>,
    lockout: Arc<LockoutGuard<L>>,
    revocation: Arc<RevocationManager<P, D>>,
    authenticator: Authenticator<P, D, L, A, R>,
    sessions: SessionQueries<P, D>,
    config: Arc<EngineConfig>,
}

impl<P, D, L, A, R> AuthEngine<P, D, L, A, R>
where
    P: PrimaryTokenTier + Send + Sync + 'static,
    D: DurableTokenTier + Send + Sync + 'static,
    L: LockoutStore + Send + Sync + 'static,
    A: LoginAttemptLog + Send + Sync + 'static,
    R: PrincipalDirectory + Send + Sync + 'static,
{
    /// Build the engine, rejecting an invalid configuration
    pub fn new(
        stores: EngineStores<P, D, L, A, R>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> AuthResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let store = TokenStore::new(stores.primary, stores.durable, config.clone());
        let issuer = Arc::new(TokenIssuer::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            config.clone(),
        ));
        let lockout = Arc::new(LockoutGuard::new(
            stores.lockouts,
            audit.clone(),
            clock.clone(),
            config.clone(),
        ));
        let revocation = Arc::new(RevocationManager::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let validator = SessionValidator::new(
            store.clone(),
            stores.directory.clone(),
            audit.clone(),
            clock.clone(),
            config.clone(),
        );
        let authenticator = Authenticator::new(
            issuer.clone(),
            lockout.clone(),
            revocation.clone(),
            stores.attempts,
            stores.directory,
            audit,
            clock.clone(),
            config.clone(),
        );
        let sessions = SessionQueries::new(store.clone(), clock);

        tracing::info!(
            sliding_window_secs = config.sliding_window.as_secs(),
            lockout_threshold = config.lockout.threshold,
            revoke_sessions_on_lockout = config.revoke_sessions_on_lockout,
            "Auth engine initialized"
        );

        Ok(Self {
            store,
            issuer,
            validator,
            lockout,
            revocation,
            authenticator,
            sessions,
            config,
        })
    }

    pub fn store(&self) -> &TokenStore<P, D> {
        &self.store
    }

    pub fn issuer(&self) -> &TokenIssuer<P, D> {
        &self.issuer
    }

    pub fn validator(&self) -> &SessionValidator<P, D, R> {
        &self.validator
    }

    pub fn lockout(&self) -> &LockoutGuard<L> {
        &self.lockout
    }

    pub fn revocation(&self) -> &RevocationManager<P, D> {
        &self.revocation
    }

    pub fn authenticator(&self) -> &Authenticator<P, D, L, A, R> {
        &self.authenticator
    }

    pub fn sessions(&self) -> &SessionQueries<P, D> {
        &self.sessions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
