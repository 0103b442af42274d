//! Shared defaults.

// ============================================================================
// CACHE
// ============================================================================

/// Default lifetime of a cached value in the shared tier (5 minutes).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// How much earlier a local entry expires than its shared counterpart.
pub const TIER1_EXPIRY_SKEW_SECS: u64 = 15;

/// Lifetime of cached user views (10 minutes).
pub const USER_CACHE_TTL_SECS: u64 = 600;

// ============================================================================
// OUTBOX RELAY
// ============================================================================

/// Maximum records dispatched per relay cycle.
pub const RELAY_BATCH_SIZE: usize = 20;

/// Pause between relay cycles.
pub const RELAY_POLL_INTERVAL_SECS: u64 = 10;
