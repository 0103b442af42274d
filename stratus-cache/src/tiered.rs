//! Cache-aside orchestration over two tiers.
//!
//! Lookups go local tier, then shared tier, then the caller's loader. Values
//! found in the shared tier are copied into the local tier with an expiry
//! `skew` earlier than the shared entry's, so a local copy never outlives the
//! shared one. Loaders that return `None` cache nothing.
//!
//! Concurrent misses on the same key each run the loader; there is no
//! request coalescing.
//!
//! Removal clears the shared tier before the local one and bumps an
//! invalidation counter. A lookup that started before the counter moved
//! drops whatever it wrote locally, so a reader racing a remove cannot leave
//! a local copy behind.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta};
use serde::{de::DeserializeOwned, Serialize};
use stratus_core::{
    CacheError, CacheKey, Clock, Timestamp, DEFAULT_CACHE_TTL_SECS, TIER1_EXPIRY_SKEW_SECS,
};

use crate::traits::{CacheStats, CacheTier, TierEntry};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tuning for [`TieredCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Shared-tier lifetime when the caller passes no TTL.
    pub default_ttl: Duration,
    /// How much earlier local entries expire than shared ones.
    pub skew: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            skew: Duration::from_secs(TIER1_EXPIRY_SKEW_SECS),
        }
    }
}

impl CacheSettings {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Orchestrator-level counters, independent of the per-tier ones.
#[derive(Debug, Default)]
struct Counters {
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    loads: AtomicU64,
    empty_loads: AtomicU64,
    shared_errors: AtomicU64,
}

/// Snapshot of [`TieredCache`] activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TieredCacheStats {
    /// Lookups answered by the local tier.
    pub local_hits: u64,
    /// Lookups answered by the shared tier.
    pub shared_hits: u64,
    /// Loader invocations.
    pub loads: u64,
    /// Loader invocations that found nothing.
    pub empty_loads: u64,
    /// Shared-tier failures absorbed as misses or skipped writes.
    pub shared_errors: u64,
    pub local: CacheStats,
    pub shared: CacheStats,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Two-tier get-or-create cache.
pub struct TieredCache {
    local: Arc<dyn CacheTier>,
    shared: Arc<dyn CacheTier>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    counters: Counters,
    invalidations: AtomicU64,
}

impl TieredCache {
    pub fn new(
        local: Arc<dyn CacheTier>,
        shared: Arc<dyn CacheTier>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            local,
            shared,
            clock,
            settings,
            counters: Counters::default(),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Return the cached value for `key`, or run `loader` and cache its result.
    ///
    /// `ttl` is the shared-tier lifetime (default from [`CacheSettings`]); the
    /// local copy lives `skew` less. Loader errors are returned unchanged and
    /// leave both tiers untouched.
    pub async fn get_or_create<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        loader: F,
        ttl: Option<Duration>,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, E>> + Send,
    {
        let generation = self.invalidations.load(Ordering::SeqCst);

        if let Some(value) = self.lookup_local::<T>(key).await {
            self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, tier = "local", "Cache hit");
            return Ok(Some(value));
        }

        if let Some((value, entry)) = self.lookup_shared::<T>(key).await {
            self.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, tier = "shared", "Cache hit");
            self.backfill_local(key, entry, generation).await;
            return Ok(Some(value));
        }

        tracing::debug!(key = %key, "Cache miss, invoking loader");
        self.counters.loads.fetch_add(1, Ordering::Relaxed);
        let loaded = loader().await?;

        match &loaded {
            Some(value) => {
                let ttl = ttl.unwrap_or(self.settings.default_ttl);
                self.populate(key, value, ttl, generation).await
            }
            None => {
                self.counters.empty_loads.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "Loader found nothing, not caching");
            }
        }

        Ok(loaded)
    }

    /// Remove `key` from both tiers. Absent keys are a no-op.
    ///
    /// The shared copy goes first so a concurrent lookup cannot backfill it
    /// into the local tier afterwards. The local copy is dropped even when
    /// the shared remove fails; that failure is still returned.
    pub async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let shared = self.shared.remove(key).await.inspect_err(|e| {
            self.counters.shared_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(key = %key, error = %e, "Shared cache tier remove failed");
        });
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.local.remove(key).await?;
        shared?;
        tracing::debug!(key = %key, "Cache entry removed");
        Ok(())
    }

    pub fn stats(&self) -> TieredCacheStats {
        TieredCacheStats {
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            shared_hits: self.counters.shared_hits.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            empty_loads: self.counters.empty_loads.load(Ordering::Relaxed),
            shared_errors: self.counters.shared_errors.load(Ordering::Relaxed),
            local: self.local.stats(),
            shared: self.shared.stats(),
        }
    }

    async fn lookup_local<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entry = match self.local.get(key).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Local cache tier read failed");
                return None;
            }
        };
        match decode(&entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Undecodable local cache entry, dropping");
                if let Err(e) = self.local.remove(key).await {
                    tracing::warn!(key = %key, error = %e, "Local cache tier remove failed");
                }
                None
            }
        }
    }

    async fn lookup_shared<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<(T, TierEntry)> {
        let entry = match self.shared.get(key).await {
            Ok(entry) => entry?,
            Err(e) => {
                self.counters.shared_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Shared cache tier read failed, treating as miss");
                return None;
            }
        };
        match decode(&entry.value) {
            Ok(value) => Some((value, entry)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Undecodable shared cache entry, treating as miss");
                None
            }
        }
    }

    /// Copy a shared entry into the local tier, expiring `skew` earlier.
    async fn backfill_local(&self, key: &CacheKey, shared: TierEntry, generation: u64) {
        let Some(expires_at) = self.local_expiry(shared.expires_at) else {
            tracing::debug!(key = %key, "Shared entry too close to expiry, skipping local backfill");
            return;
        };
        self.write_local(key, TierEntry::new(shared.value, expires_at), generation)
            .await;
    }

    async fn populate<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
        generation: u64,
    ) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cannot serialize loaded value, not caching");
                return;
            }
        };
        let Some(shared_expiry) = shared_expiry(self.clock.now(), ttl) else {
            tracing::warn!(key = %key, ttl_secs = ttl.as_secs(), "TTL out of range, not caching");
            return;
        };

        if let Err(e) = self
            .shared
            .put(key, TierEntry::new(bytes.clone(), shared_expiry))
            .await
        {
            self.counters.shared_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(key = %key, error = %e, "Shared cache tier write failed, skipping");
        }

        if let Some(local_expiry) = self.local_expiry(shared_expiry) {
            self.write_local(key, TierEntry::new(bytes, local_expiry), generation)
                .await;
        }
    }

    /// Write to the local tier, then undo the write if a remove ran since
    /// the lookup that produced it began.
    async fn write_local(&self, key: &CacheKey, entry: TierEntry, generation: u64) {
        if let Err(e) = self.local.put(key, entry).await {
            tracing::warn!(key = %key, error = %e, "Local cache tier write failed");
            return;
        }
        if self.invalidations.load(Ordering::SeqCst) != generation {
            tracing::debug!(key = %key, "Invalidated during lookup, dropping local copy");
            if let Err(e) = self.local.remove(key).await {
                tracing::warn!(key = %key, error = %e, "Local cache tier remove failed");
            }
        }
    }

    /// Local expiry for a shared expiry, or `None` when the local copy would
    /// already be dead.
    fn local_expiry(&self, shared_expiry: Timestamp) -> Option<Timestamp> {
        let skew = TimeDelta::from_std(self.settings.skew).ok()?;
        let expires_at = shared_expiry.checked_sub_signed(skew)?;
        (expires_at > self.clock.now()).then_some(expires_at)
    }
}

/// `now + ttl`, truncated to the millisecond precision the shared tier keeps.
fn shared_expiry(now: Timestamp, ttl: Duration) -> Option<Timestamp> {
    let expires_at = now.checked_add_signed(TimeDelta::from_std(ttl).ok()?)?;
    DateTime::from_timestamp_millis(expires_at.timestamp_millis())
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Deserialization {
        reason: e.to_string(),
    })
}
