//! services/client/src/app/state.rs
//!
//! Defines the shared application state, constructed once at startup and
//! handed to every screen. Nothing in here is looked up ambiently: the
//! provider, data service and navigator are injected.

use daily_gk_core::ports::{AuthProvider, DataService, Navigator, PortResult};
use std::sync::Arc;
use tracing::info;

use super::auth_bridge::AuthBridge;
use super::mutations::Mutations;
use super::queries::Queries;
use super::query_cache::{QueryCache, QueryOptions};
use super::session_store::SessionStore;
use crate::config::Config;

pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<SessionStore>,
    pub cache: QueryCache,
    pub queries: Queries,
    pub mutations: Mutations,
    bridge: AuthBridge,
}

impl AppState {
    /// Builds the store, cache, read models and mutations, then starts the
    /// auth bridge. Must be called inside a Tokio runtime.
    pub fn start(
        config: Arc<Config>,
        auth: Arc<dyn AuthProvider>,
        data: Arc<dyn DataService>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let session = Arc::new(SessionStore::new(
            auth.clone(),
            config.sign_up_redirect(),
            config.password_reset_redirect(),
        ));
        let cache = QueryCache::new();
        let queries = Queries::new(
            cache.clone(),
            data.clone(),
            QueryOptions::stale_after(config.stale_after),
            config.digest_bucket.clone(),
        );
        let mutations = Mutations::new(cache.clone(), data, queries.clone());
        let bridge = AuthBridge::start(auth, session.clone(), navigator);

        info!(stale_after = ?config.stale_after, "Application state initialised");
        Self {
            config,
            session,
            cache,
            queries,
            mutations,
            bridge,
        }
    }

    /// Retries the initial-session probe after it failed at startup.
    pub async fn retry_initial_session(&self) -> PortResult<()> {
        self.bridge.retry_initial().await
    }

    pub async fn shutdown(self) {
        self.bridge.shutdown().await;
        info!("Application state shut down");
    }
}
