use std::sync::Arc;
use std::time::Duration;

use avtale_core::{
    Account, Clock, NotificationSink, Role, SchedulingEngine, SessionRegistry, Snapshot, Store,
    UnitOfWork,
};
use avtale_db::RedbStore;

use crate::auth::{hash_password, SessionStore};
use crate::config::AdminBootstrap;
use crate::error::ApiError;
use crate::middleware::{login_limiter, RateLimiter};

pub type Engine = SchedulingEngine<RedbStore>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Arc<RedbStore>,
    pub clock: Arc<dyn Clock>,
    pub sessions: Arc<SessionStore>,
    pub registry: Arc<SessionRegistry>,
    pub login_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        store: Arc<RedbStore>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        session_ttl: Duration,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(session_ttl));
        let registry = Arc::new(SessionRegistry::new(sessions.clone()));
        let engine = Arc::new(SchedulingEngine::new(store.clone(), clock.clone(), sink));

        Self {
            engine,
            store,
            clock,
            sessions,
            registry,
            login_limiter: Arc::new(login_limiter()),
        }
    }

    /// Create the configured administrator unless the username already exists.
    /// Returns whether an account was created.
    pub fn ensure_admin(&self, admin: &AdminBootstrap) -> Result<bool, ApiError> {
        let exists = self
            .store
            .snapshot(|s: &dyn Snapshot| s.account(&admin.username))?
            .is_some();
        if exists {
            return Ok(false);
        }

        let mut account = Account::new(
            admin.username.clone(),
            hash_password(&admin.password)?,
            Role::Admin,
        );
        account.verified = true;
        self.store
            .run_atomic(|tx: &mut dyn UnitOfWork| tx.insert_account(&account))?;

        tracing::info!("Created administrator account {}", admin.username);
        Ok(true)
    }

    /// Drop expired sessions and their registry entries, and stale
    /// rate-limit counters.
    pub fn prune(&self) {
        let expired = self.sessions.prune_expired();
        for (username, handle) in &expired {
            self.registry.release_if(username, handle);
        }
        self.login_limiter.cleanup();

        if !expired.is_empty() {
            tracing::debug!("Pruned {} expired sessions", expired.len());
        }
    }

    /// Run `prune` every `interval`, forever.
    pub async fn run_maintenance(&self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            self.prune();
        }
    }
}
