// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client-side session synchronization.
//!
//! A [`SessionController`] is built once per UI tree root. `start()` spawns
//! the event subscriber, the bootstrap and the bootstrap fallback timer;
//! `shutdown()` (or dropping the controller) tears all of them down.

pub mod bootstrap;
pub mod cache;
pub mod logout;
pub mod profile_fetcher;
pub mod store;
pub mod subscriber;

pub use bootstrap::BootstrapOutcome;
pub use cache::{FileStorage, KeyValueStore, MemoryStorage, SessionCache, StorageError};
pub use logout::LogoutOutcome;
pub use profile_fetcher::{ProfileFetch, ProfileFetcher};
pub use store::{AuthStatus, SessionSnapshot, SessionStore, WriteTicket};

use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::models::{Identity, Profile, Session};
use crate::services::AuthProvider;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything the session tasks share.
pub(crate) struct SessionContext {
    pub config: SessionConfig,
    pub auth: Arc<dyn AuthProvider>,
    pub fetcher: ProfileFetcher,
    pub store: SessionStore,
    pub cache: SessionCache,
    pub local_storage: Arc<dyn KeyValueStore>,
    pub session_storage: Arc<dyn KeyValueStore>,
}

impl SessionContext {
    /// Record a service-confirmed session's identity and cache it.
    pub fn install(&self, ticket: WriteTicket, session: &Session) -> bool {
        if !self.store.set_identity(ticket, session.user.clone()) {
            return false;
        }
        self.cache.store(session);
        true
    }

    /// Install a service-confirmed session, then fetch its profile.
    pub async fn populate(&self, ticket: WriteTicket, session: &Session) -> Option<Profile> {
        if !self.install(ticket, session) {
            return None;
        }

        let profile = self.fetcher.fetch(&session.user).await.into_profile();
        self.store
            .set_profile(ticket, &session.user.id, profile.clone());
        profile
    }

    /// Best-effort removal of auth keys from both storages.
    pub fn purge_storage(&self) -> Vec<String> {
        let mut removed = cache::purge_matching(
            self.local_storage.as_ref(),
            &self.config.purge_patterns,
        );
        removed.extend(cache::purge_matching(
            self.session_storage.as_ref(),
            &self.config.purge_patterns,
        ));
        removed
    }
}

/// Owns the session store and the tasks that keep it in sync.
pub struct SessionController {
    ctx: Arc<SessionContext>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionController {
    /// Build a controller. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: SessionConfig,
        auth: Arc<dyn AuthProvider>,
        local_storage: Arc<dyn KeyValueStore>,
        session_storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self, AuthError> {
        let fetcher = ProfileFetcher::new(&config.api_base_url, auth.clone(), config.http_timeout)?;
        let cache = SessionCache::new(local_storage.clone(), config.cache_key.clone());

        Ok(Self {
            ctx: Arc::new(SessionContext {
                config,
                auth,
                fetcher,
                store: SessionStore::new(),
                cache,
                local_storage,
                session_storage,
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Subscribe to auth events and run the bootstrap. Calling it again is
    /// a no-op.
    pub fn start(&self) {
        let mut tasks = self.lock_tasks();
        if !tasks.is_empty() || self.ctx.store.is_closed() {
            return;
        }

        // Subscribe before bootstrapping so no event falls in between.
        let events = self.ctx.auth.subscribe();
        tasks.push(tokio::spawn(subscriber::run(self.ctx.clone(), events)));

        let ctx = self.ctx.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = bootstrap::run(&ctx).await;
            tracing::debug!(?outcome, "Bootstrap finished");
        }));

        let ctx = self.ctx.clone();
        tasks.push(tokio::spawn(async move {
            tokio::time::sleep(ctx.config.bootstrap_timeout).await;
            if ctx.store.finish_loading() {
                tracing::warn!(
                    timeout_ms = ctx.config.bootstrap_timeout.as_millis() as u64,
                    "Bootstrap still pending, leaving loading state"
                );
            }
        }));
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.ctx.store.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.ctx.store.subscribe()
    }

    /// Wait until initialization is complete and return the state then.
    pub async fn wait_until_loaded(&self) -> SessionSnapshot {
        let mut rx = self.watch();
        let loaded = rx.wait_for(|s| !s.loading).await.map(|s| s.clone());
        loaded.unwrap_or_else(|_| self.snapshot())
    }

    pub fn identity(&self) -> Option<Identity> {
        self.snapshot().identity
    }

    pub fn profile(&self) -> Option<Profile> {
        self.snapshot().profile
    }

    /// Password sign-in. The store is updated by the resulting `SIGNED_IN`
    /// event.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let session = self.ctx.auth.sign_in_with_password(email, password).await?;
        Ok(session.user)
    }

    /// Re-fetch the profile for the current identity.
    pub async fn refresh_profile(&self) -> ProfileFetch {
        let ticket = self.ctx.store.begin();
        let Some(identity) = self.snapshot().identity else {
            return ProfileFetch::NoToken;
        };

        let fetch = self.ctx.fetcher.fetch(&identity).await;
        self.ctx
            .store
            .set_profile(ticket, &identity.id, fetch.profile().cloned());
        fetch
    }

    pub async fn logout(&self) -> LogoutOutcome {
        logout::run(&self.ctx).await
    }

    /// Stop all tasks and refuse further writes.
    pub fn shutdown(&self) {
        self.ctx.store.close();
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
