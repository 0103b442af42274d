//! Stratus Cache - tiered cache-aside layer
//!
//! A [`TieredCache`] composes a fast in-process [`LocalTier`] with a shared
//! durable [`LmdbTier`]. Callers read through
//! [`TieredCache::get_or_create`] and invalidate with [`TieredCache::remove`].
//!
//! # Example
//!
//! ```ignore
//! let key = CacheKey::new(tenant_id, EntityKind::User, user_id.as_uuid());
//! let view = cache
//!     .get_or_create(&key, || async { store.load_view(user_id).await }, None)
//!     .await?;
//! ```

pub mod lmdb;
pub mod local;
pub mod tiered;
pub mod traits;

pub use lmdb::{LmdbTier, LmdbTierError};
pub use local::LocalTier;
pub use tiered::{CacheSettings, TieredCache, TieredCacheStats};
pub use traits::{CacheStats, CacheTier, TierEntry};
