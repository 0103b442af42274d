//! Cache tier trait and statistics.
//!
//! A tier stores opaque bytes under a [`CacheKey`] together with an absolute
//! expiry. Tiers never interpret values; serialization happens in
//! [`crate::TieredCache`].

use async_trait::async_trait;
use stratus_core::{CacheError, CacheKey, Timestamp};

/// A stored value and the instant it stops being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierEntry {
    pub value: Vec<u8>,
    pub expires_at: Timestamp,
}

impl TierEntry {
    pub fn new(value: Vec<u8>, expires_at: Timestamp) -> Self {
        Self { value, expires_at }
    }

    /// An entry is live strictly before its expiry instant.
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

/// One storage tier of the cache.
///
/// Implementations must be safe for concurrent use and must never return an
/// entry that has expired according to their clock.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Short name used in logs and metrics labels.
    fn name(&self) -> &'static str;

    /// Fetch a live entry.
    async fn get(&self, key: &CacheKey) -> Result<Option<TierEntry>, CacheError>;

    /// Insert or replace an entry.
    async fn put(&self, key: &CacheKey, entry: TierEntry) -> Result<(), CacheError>;

    /// Remove an entry. Returns whether one was present; absence is not an error.
    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Usage counters for this tier.
    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, including expired entries.
    pub misses: u64,
    /// Number of entries currently stored (expired entries included until
    /// they are purged).
    pub entry_count: u64,
    /// Number of entries dropped or refused because of capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
