//! In-process tier backed by a sharded concurrent map.
//!
//! Expired entries are dropped lazily when read, and in bulk when a bounded
//! tier runs out of room.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use stratus_core::{CacheError, CacheKey, Clock};

use crate::traits::{CacheStats, CacheTier, TierEntry};

/// Fast, per-process cache tier.
pub struct LocalTier {
    entries: DashMap<String, TierEntry>,
    clock: Arc<dyn Clock>,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LocalTier {
    /// An unbounded tier.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            max_entries: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Cap the number of stored entries. A full tier first purges expired
    /// entries, then refuses new keys until space frees up.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live_at(now));
        before.saturating_sub(self.entries.len())
    }

    fn has_room_for(&self, key: &str) -> bool {
        let Some(max) = self.max_entries else {
            return true;
        };
        if self.entries.contains_key(key) || self.entries.len() < max {
            return true;
        }
        let purged = self.purge_expired();
        self.evictions.fetch_add(purged as u64, Ordering::Relaxed);
        self.entries.len() < max
    }
}

#[async_trait]
impl CacheTier for LocalTier {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<TierEntry>, CacheError> {
        let now = self.clock.now();
        let entry = match self.entries.get(key.as_str()) {
            Some(entry) => entry.value().clone(),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        if !entry.is_live_at(now) {
            // A concurrent put may have replaced the entry since we read it.
            self.entries
                .remove_if(key.as_str(), |_, current| !current.is_live_at(now));
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry))
    }

    async fn put(&self, key: &CacheKey, entry: TierEntry) -> Result<(), CacheError> {
        if !self.has_room_for(key.as_str()) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Local cache tier full, skipping write");
            return Ok(());
        }
        self.entries.insert(key.as_str().to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key.as_str()).is_some())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use std::time::Duration;
    use stratus_core::{EntityKind, ManualClock, TenantId, UserId};

    fn key() -> CacheKey {
        CacheKey::new(TenantId::now_v7(), EntityKind::User, UserId::now_v7().as_uuid())
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let clock = Arc::new(ManualClock::default());
        let tier = LocalTier::new(clock.clone());
        let key = key();
        let entry = TierEntry::new(b"v".to_vec(), clock.now() + TimeDelta::seconds(10));

        tier.put(&key, entry.clone()).await.expect("put should succeed");
        assert_eq!(tier.get(&key).await.expect("get should succeed"), Some(entry));

        assert!(tier.remove(&key).await.expect("remove should succeed"));
        assert!(!tier.remove(&key).await.expect("second remove should succeed"));
        assert_eq!(tier.get(&key).await.expect("get should succeed"), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_and_dropped() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tier = LocalTier::new(clock.clone());
        let key = key();
        tier.put(
            &key,
            TierEntry::new(b"v".to_vec(), clock.now() + TimeDelta::seconds(5)),
        )
        .await
        .expect("put should succeed");

        clock.advance(Duration::from_secs(5));
        assert_eq!(tier.get(&key).await.expect("get should succeed"), None);
        assert!(tier.is_empty());

        let stats = tier.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_bounded_tier_purges_expired_then_refuses() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tier = LocalTier::new(clock.clone()).with_max_entries(2);
        let short = TierEntry::new(b"s".to_vec(), clock.now() + TimeDelta::seconds(1));
        let long = TierEntry::new(b"l".to_vec(), clock.now() + TimeDelta::seconds(60));

        let (a, b, c, d) = (key(), key(), key(), key());
        tier.put(&a, short).await.expect("put should succeed");
        tier.put(&b, long.clone()).await.expect("put should succeed");

        clock.advance(Duration::from_secs(2));
        tier.put(&c, long.clone()).await.expect("put should succeed");
        assert!(tier.get(&c).await.expect("get should succeed").is_some());
        assert_eq!(tier.len(), 2);

        // Full with live entries: the write is skipped, not an error.
        tier.put(&d, long).await.expect("put should succeed");
        assert!(tier.get(&d).await.expect("get should succeed").is_none());
        assert!(tier.stats().evictions >= 2);
    }
}
