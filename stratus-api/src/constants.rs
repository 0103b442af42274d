//! Constants for the Stratus API
//!
//! Defaults for every environment-driven setting, plus header names.

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

// ============================================================================
// DATABASE
// ============================================================================

/// Default maximum connection pool size
pub const DEFAULT_DB_POOL_SIZE: usize = 16;

/// Default connection timeout in seconds
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// CACHE
// ============================================================================

/// Default directory of the LMDB shared tier
pub const DEFAULT_TIER2_PATH: &str = "./data/cache";

/// Default LMDB map size in megabytes
pub const DEFAULT_TIER2_MAP_SIZE_MB: usize = 256;

/// Default bound on local-tier entries
pub const DEFAULT_TIER1_MAX_ENTRIES: usize = 10_000;

// ============================================================================
// FANOUT
// ============================================================================

/// Default search index receiving user documents
pub const DEFAULT_SEARCH_INDEX: &str = "users";

/// Default timeout for outbound fanout requests
pub const DEFAULT_FANOUT_TIMEOUT_SECS: u64 = 10;

/// Default buffer of the realtime notification channel
pub const DEFAULT_NOTIFY_CAPACITY: usize = 1000;

/// Header carrying the webhook payload signature
pub const SIGNATURE_HEADER: &str = "X-Stratus-Signature";

// ============================================================================
// REQUEST CONTEXT
// ============================================================================

/// Header naming the calling tenant
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Header carrying the request correlation id
pub const CORRELATION_HEADER: &str = "x-correlation-id";
