//! Property-Based Tests for the tiered cache
//!
//! **Property: Local copies never outlive shared copies**
//!
//! For any TTL and skew, an entry populated by a loader or backfilled from
//! the shared tier expires in the local tier exactly `skew` before the shared
//! tier, or is not stored locally at all.
//!
//! **Property: Keys are tenant-bound and deterministic**

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta};
use proptest::prelude::*;
use stratus_cache::{CacheSettings, CacheTier, LmdbTier, LocalTier, TierEntry, TieredCache};
use stratus_core::{CacheKey, Clock, EntityKind, ManualClock, TenantId};
use tempfile::TempDir;
use tokio::runtime::Runtime;
use uuid::Uuid;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn uuid_strategy() -> impl Strategy<Value = Uuid> {
    any::<u128>().prop_map(Uuid::from_u128)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Populating from the loader writes local expiry = shared expiry - skew.
    #[test]
    fn prop_populate_respects_skew(
        ttl_secs in 1u64..7_200,
        skew_secs in 0u64..120,
        start_millis in 1_600_000_000_000i64..1_900_000_000_000,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let start = DateTime::from_timestamp_millis(start_millis)
                .ok_or_else(|| TestCaseError::fail("start out of range"))?;
            let clock = Arc::new(ManualClock::new(start));
            let local = Arc::new(LocalTier::new(clock.clone()));
            let shared = Arc::new(LocalTier::new(clock.clone()));
            let cache = TieredCache::new(
                local.clone(),
                shared.clone(),
                clock.clone(),
                CacheSettings::default().with_skew(Duration::from_secs(skew_secs)),
            );
            let key = CacheKey::new(TenantId::now_v7(), EntityKind::User, Uuid::now_v7());

            let value = cache
                .get_or_create(
                    &key,
                    || async { Ok::<_, String>(Some(42u32)) },
                    Some(Duration::from_secs(ttl_secs)),
                )
                .await
                .map_err(TestCaseError::fail)?;
            prop_assert_eq!(value, Some(42));

            let shared_entry = shared
                .get(&key)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?
                .ok_or_else(|| TestCaseError::fail("shared entry missing"))?;
            prop_assert_eq!(shared_entry.expires_at, start + TimeDelta::seconds(ttl_secs as i64));

            let local_entry = local
                .get(&key)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            if ttl_secs > skew_secs {
                let local_entry = local_entry.ok_or_else(|| TestCaseError::fail("local entry missing"))?;
                prop_assert_eq!(
                    local_entry.expires_at,
                    shared_entry.expires_at - TimeDelta::seconds(skew_secs as i64)
                );
            } else {
                prop_assert!(local_entry.is_none());
            }
            Ok(())
        })?;
    }

    /// Backfilling from LMDB keeps the local copy exactly `skew` behind.
    #[test]
    fn prop_backfill_from_lmdb_respects_skew(
        remaining_secs in 16u64..3_600,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let dir = TempDir::new().map_err(|e| TestCaseError::fail(e.to_string()))?;
            let clock = Arc::new(ManualClock::default());
            let shared = Arc::new(
                LmdbTier::open(dir.path(), 10, clock.clone())
                    .map_err(|e| TestCaseError::fail(e.to_string()))?,
            );
            let local = Arc::new(LocalTier::new(clock.clone()));
            let cache = TieredCache::new(
                local.clone(),
                shared.clone(),
                clock.clone(),
                CacheSettings::default(),
            );
            let key = CacheKey::new(TenantId::now_v7(), EntityKind::User, Uuid::now_v7());

            let shared_expiry = DateTime::from_timestamp_millis(
                (clock.now() + TimeDelta::seconds(remaining_secs as i64)).timestamp_millis(),
            )
            .ok_or_else(|| TestCaseError::fail("expiry out of range"))?;
            shared
                .put(&key, TierEntry::new(b"\"cached\"".to_vec(), shared_expiry))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let value: Option<String> = cache
                .get_or_create(&key, || async { Ok::<_, String>(None) }, None)
                .await
                .map_err(TestCaseError::fail)?;
            prop_assert_eq!(value.as_deref(), Some("cached"));

            let local_entry = local
                .get(&key)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?
                .ok_or_else(|| TestCaseError::fail("local entry missing"))?;
            prop_assert_eq!(local_entry.expires_at, shared_expiry - TimeDelta::seconds(15));
            Ok(())
        })?;
    }

    /// Key rendering depends only on its inputs and always carries the tenant.
    #[test]
    fn prop_cache_key_deterministic(
        tenant in uuid_strategy(),
        id in uuid_strategy(),
    ) {
        let a = CacheKey::new(TenantId::new(tenant), EntityKind::User, id);
        let b = CacheKey::new(TenantId::new(tenant), EntityKind::User, id);
        prop_assert_eq!(&a, &b);
        prop_assert!(a.as_str().starts_with(&tenant.to_string()));
        prop_assert_eq!(a.entity_part(), format!("user-{}", id));
    }
}
