//! LMDB-backed shared tier.
//!
//! Uses the heed crate (Rust bindings for LMDB). Every process on a host
//! that opens the same directory shares the same entries, which makes this
//! the durable second tier behind [`crate::LocalTier`].
//!
//! # Value Format
//!
//! `[expires_at: i64 unix millis, little endian][payload bytes]`
//!
//! Expired entries are treated as misses and deleted lazily on read.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use stratus_core::{CacheError, CacheKey, Clock};

use crate::traits::{CacheStats, CacheTier, TierEntry};

const EXPIRY_PREFIX_LEN: usize = 8;

/// Error type for LMDB tier operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbTierError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes do not match the value format.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbTierError> for CacheError {
    fn from(e: LmdbTierError) -> Self {
        CacheError::Backend {
            tier: "lmdb",
            reason: e.to_string(),
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbTierError {
    LmdbTierError::Transaction(e.to_string())
}

/// Shared cache tier stored in an LMDB environment.
pub struct LmdbTier {
    env: Env,
    db: Database<Bytes, Bytes>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LmdbTier {
    /// Open (or create) the tier under `path` with a map of `max_size_mb`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LmdbTierError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbTierError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbTierError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self {
            env,
            db,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn encode(entry: &TierEntry) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(EXPIRY_PREFIX_LEN + entry.value.len());
        bytes.extend_from_slice(&entry.expires_at.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&entry.value);
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<TierEntry, LmdbTierError> {
        if bytes.len() < EXPIRY_PREFIX_LEN {
            return Err(LmdbTierError::Corrupt(format!(
                "entry is {} bytes, shorter than the expiry prefix",
                bytes.len()
            )));
        }
        let (prefix, value) = bytes.split_at(EXPIRY_PREFIX_LEN);
        let millis = i64::from_le_bytes(
            prefix
                .try_into()
                .map_err(|_| LmdbTierError::Corrupt("invalid expiry prefix".to_string()))?,
        );
        let expires_at = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| LmdbTierError::Corrupt(format!("expiry out of range: {}", millis)))?;
        Ok(TierEntry::new(value.to_vec(), expires_at))
    }

    fn read(&self, key: &CacheKey) -> Result<Option<TierEntry>, LmdbTierError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        match self.db.get(&rtxn, key.as_str().as_bytes()).map_err(txn_error)? {
            Some(bytes) => Self::decode(bytes).map(Some),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &CacheKey) -> Result<bool, LmdbTierError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self
            .db
            .delete(&mut wtxn, key.as_str().as_bytes())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    fn entry_count(&self) -> u64 {
        self.env
            .read_txn()
            .and_then(|rtxn| self.db.len(&rtxn))
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheTier for LmdbTier {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<TierEntry>, CacheError> {
        let entry = match self.read(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Err(LmdbTierError::Corrupt(reason)) => {
                tracing::warn!(key = %key, reason = %reason, "Dropping corrupt LMDB cache entry");
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.delete(key)?;
                return Ok(None);
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };

        if !entry.is_live_at(self.clock.now()) {
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.delete(key)?;
            return Ok(None);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry))
    }

    async fn put(&self, key: &CacheKey, entry: TierEntry) -> Result<(), CacheError> {
        let bytes = Self::encode(&entry);
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_str().as_bytes(), &bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.delete(key)?)
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entry_count(),
            evictions: 0, // LMDB has no capacity eviction; a full map fails writes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use std::time::Duration;
    use stratus_core::{EntityKind, ManualClock, TenantId, UserId};
    use tempfile::TempDir;

    fn create_test_tier() -> (LmdbTier, Arc<ManualClock>, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tier =
            LmdbTier::open(temp_dir.path(), 10, clock.clone()).expect("tier open should succeed");
        (tier, clock, temp_dir)
    }

    fn key(tenant: TenantId) -> CacheKey {
        CacheKey::new(tenant, EntityKind::User, UserId::now_v7().as_uuid())
    }

    fn millis(ts: stratus_core::Timestamp) -> stratus_core::Timestamp {
        DateTime::from_timestamp_millis(ts.timestamp_millis()).expect("in range")
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (tier, clock, _dir) = create_test_tier();
        let key = key(TenantId::now_v7());
        let expires_at = millis(clock.now() + TimeDelta::seconds(30));

        tier.put(&key, TierEntry::new(b"{\"a\":1}".to_vec(), expires_at))
            .await
            .expect("put should succeed");

        let entry = tier
            .get(&key)
            .await
            .expect("get should succeed")
            .expect("entry should exist");
        assert_eq!(entry.value, b"{\"a\":1}".to_vec());
        assert_eq!(entry.expires_at, expires_at);
        assert_eq!(tier.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (tier, _clock, _dir) = create_test_tier();
        let result = tier
            .get(&key(TenantId::now_v7()))
            .await
            .expect("get should succeed");
        assert!(result.is_none());
        assert_eq!(tier.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_deleted_on_read() {
        let (tier, clock, _dir) = create_test_tier();
        let key = key(TenantId::now_v7());
        tier.put(
            &key,
            TierEntry::new(b"x".to_vec(), clock.now() + TimeDelta::seconds(1)),
        )
        .await
        .expect("put should succeed");
        assert_eq!(tier.stats().entry_count, 1);

        clock.advance(Duration::from_secs(2));
        assert!(tier.get(&key).await.expect("get should succeed").is_none());
        assert_eq!(tier.stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let (tier, _clock, _dir) = create_test_tier();
        let removed = tier
            .remove(&key(TenantId::now_v7()))
            .await
            .expect("remove should succeed");
        assert!(!removed);
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let (tier, clock, _dir) = create_test_tier();
        let id = UserId::now_v7().as_uuid();
        let tenant_a = CacheKey::new(TenantId::now_v7(), EntityKind::User, id);
        let tenant_b = CacheKey::new(TenantId::now_v7(), EntityKind::User, id);

        tier.put(
            &tenant_a,
            TierEntry::new(b"a".to_vec(), clock.now() + TimeDelta::seconds(30)),
        )
        .await
        .expect("put should succeed");

        assert!(tier.get(&tenant_b).await.expect("get should succeed").is_none());
        assert!(tier.get(&tenant_a).await.expect("get should succeed").is_some());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (tier, clock, _dir) = create_test_tier();
        let key = key(TenantId::now_v7());
        let expires_at = clock.now() + TimeDelta::seconds(30);
        tier.put(&key, TierEntry::new(b"old".to_vec(), expires_at))
            .await
            .expect("put should succeed");
        tier.put(&key, TierEntry::new(b"new".to_vec(), expires_at))
            .await
            .expect("put should succeed");

        let entry = tier
            .get(&key)
            .await
            .expect("get should succeed")
            .expect("entry should exist");
        assert_eq!(entry.value, b"new".to_vec());
        assert_eq!(tier.stats().entry_count, 1);
    }

    #[test]
    fn test_decode_rejects_short_entry() {
        assert!(matches!(
            LmdbTier::decode(&[1, 2, 3]),
            Err(LmdbTierError::Corrupt(_))
        ));
    }
}
