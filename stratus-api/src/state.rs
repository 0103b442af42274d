//! Application State
//!
//! [`build_app_state`] is the composition root: it constructs the store, both
//! cache tiers, the fanout targets, the change recorder and the outbox relay
//! explicitly from configuration. Nothing is resolved implicitly afterwards.

use std::sync::Arc;

use stratus_cache::{CacheSettings, LmdbTier, LocalTier, TieredCache};
use stratus_core::{CacheError, Clock};
use stratus_storage::{ChangeStore, InMemoryStore};

use crate::config::{AppConfig, StoreBackend};
use crate::db::PgStore;
use crate::error::ApiResult;
use crate::events::ChangeSubscribers;
use crate::fanout::{BroadcastNotifier, FanoutTargets};
use crate::jobs::{OutboxRelay, RelayConfig};
use crate::recorder::ChangeRecorder;

/// Shared handles for the router and the background relay.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChangeStore>,
    pub cache: Arc<TieredCache>,
    pub recorder: Arc<ChangeRecorder>,
    pub relay: Arc<OutboxRelay>,
    pub notifier: Arc<BroadcastNotifier>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire already-built components together.
    pub fn assemble(
        store: Arc<dyn ChangeStore>,
        cache: Arc<TieredCache>,
        targets: FanoutTargets,
        notifier: Arc<BroadcastNotifier>,
        subscribers: ChangeSubscribers,
        clock: Arc<dyn Clock>,
        relay_config: RelayConfig,
    ) -> Self {
        let recorder = Arc::new(ChangeRecorder::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            subscribers,
            Arc::clone(&clock),
        ));
        let relay = Arc::new(OutboxRelay::new(
            Arc::clone(&store),
            targets,
            Arc::clone(&clock),
            relay_config,
        ));
        Self {
            store,
            cache,
            recorder,
            relay,
            notifier,
            clock,
        }
    }
}

/// Open the configured primary store.
pub async fn build_store(config: &AppConfig) -> ApiResult<Arc<dyn ChangeStore>> {
    match config.api.store {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PgStore::from_config(&config.db)?;
            store.health_check().await?;
            store.ensure_schema().await?;
            tracing::info!(
                host = %config.db.host,
                dbname = %config.db.dbname,
                pool_size = store.pool_size(),
                "PostgreSQL store ready"
            );
            Ok(Arc::new(store))
        }
    }
}

/// Open both cache tiers and the orchestrator over them.
pub fn build_cache(config: &AppConfig, clock: Arc<dyn Clock>) -> ApiResult<Arc<TieredCache>> {
    let local = LocalTier::new(Arc::clone(&clock)).with_max_entries(config.cache.tier1_max_entries);
    let shared = LmdbTier::open(
        &config.cache.tier2_path,
        config.cache.tier2_map_size_mb,
        Arc::clone(&clock),
    )
    .map_err(CacheError::from)?;

    let settings: CacheSettings = config.cache.settings();
    tracing::info!(
        path = %config.cache.tier2_path.display(),
        map_size_mb = config.cache.tier2_map_size_mb,
        local_max_entries = config.cache.tier1_max_entries,
        default_ttl_secs = settings.default_ttl.as_secs(),
        skew_secs = settings.skew.as_secs(),
        "Tiered cache ready"
    );

    Ok(Arc::new(TieredCache::new(
        Arc::new(local),
        Arc::new(shared),
        clock,
        settings,
    )))
}

/// Build every component from configuration.
pub async fn build_app_state(config: &AppConfig, clock: Arc<dyn Clock>) -> ApiResult<AppState> {
    let store = build_store(config).await?;
    let cache = build_cache(config, Arc::clone(&clock))?;
    let notifier = Arc::new(BroadcastNotifier::new(config.fanout.notify_capacity));
    let targets = FanoutTargets::from_config(&config.fanout, Arc::clone(&notifier))?;

    Ok(AppState::assemble(
        store,
        cache,
        targets,
        notifier,
        ChangeSubscribers::standard(),
        clock,
        config.relay.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use stratus_core::SystemClock;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_build_app_state_with_memory_store() {
        let dir = TempDir::new().expect("temp dir should be created");
        let config = AppConfig {
            cache: CacheConfig {
                tier2_path: dir.path().join("cache"),
                tier2_map_size_mb: 8,
                ..Default::default()
            },
            ..Default::default()
        };

        let state = build_app_state(&config, Arc::new(SystemClock))
            .await
            .expect("state should build");

        assert_eq!(
            state.store.outbox_pending_count().await.expect("count"),
            0
        );
        assert_eq!(state.relay.config(), &RelayConfig::default());
        assert_eq!(state.cache.settings(), &config.cache.settings());
    }
}
