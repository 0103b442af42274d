//! API Configuration Module
//!
//! One struct per concern, each loaded from `STRATUS_*` environment variables
//! with defaults for development. Unparseable numbers fall back to the
//! default; an unknown `STRATUS_STORE` is a [`ConfigError`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use stratus_cache::CacheSettings;
use stratus_core::{ConfigError, DEFAULT_CACHE_TTL_SECS, TIER1_EXPIRY_SKEW_SECS};

use crate::constants::{
    DEFAULT_BIND_HOST, DEFAULT_FANOUT_TIMEOUT_SECS, DEFAULT_NOTIFY_CAPACITY, DEFAULT_PORT,
    DEFAULT_SEARCH_INDEX, DEFAULT_TIER1_MAX_ENTRIES, DEFAULT_TIER2_MAP_SIZE_MB,
    DEFAULT_TIER2_PATH,
};
use crate::db::DbConfig;
use crate::error::{ApiError, ApiResult};
use crate::jobs::RelayConfig;

/// Environment lookup, injectable for tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub(crate) fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

pub(crate) fn parsed<T: FromStr>(env: EnvLookup<'_>, key: &str, default: T) -> T {
    env(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn non_empty(env: EnvLookup<'_>, key: &str) -> Option<String> {
    env(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Which primary store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Process-local store; state is lost on restart.
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(ConfigError::InvalidValue {
                field: "STRATUS_STORE".to_string(),
                value: other.to_string(),
                reason: "expected 'memory' or 'postgres'".to_string(),
            }),
        }
    }
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_host: String,
    pub port: u16,
    pub store: StoreBackend,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            store: StoreBackend::default(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// - `STRATUS_API_BIND`: bind host (default: 0.0.0.0)
    /// - `PORT` or `STRATUS_API_PORT`: listen port (default: 3000)
    /// - `STRATUS_STORE`: `memory` or `postgres` (default: memory)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let port = env("PORT")
            .or_else(|| env("STRATUS_API_PORT"))
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let store = match non_empty(env, "STRATUS_STORE") {
            Some(raw) => raw.parse()?,
            None => StoreBackend::default(),
        };

        Ok(Self {
            bind_host: non_empty(env, "STRATUS_API_BIND")
                .unwrap_or_else(|| DEFAULT_BIND_HOST.to_string()),
            port,
            store,
        })
    }

    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::malformed(format!("Invalid bind address {}: {}", addr, e)))
    }
}

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

/// Settings for both cache tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory of the LMDB environment.
    pub tier2_path: PathBuf,
    pub tier2_map_size_mb: usize,
    /// Upper bound on local entries.
    pub tier1_max_entries: usize,
    pub default_ttl: Duration,
    pub skew: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tier2_path: PathBuf::from(DEFAULT_TIER2_PATH),
            tier2_map_size_mb: DEFAULT_TIER2_MAP_SIZE_MB,
            tier1_max_entries: DEFAULT_TIER1_MAX_ENTRIES,
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            skew: Duration::from_secs(TIER1_EXPIRY_SKEW_SECS),
        }
    }
}

impl CacheConfig {
    /// Create CacheConfig from environment variables.
    ///
    /// - `STRATUS_CACHE_PATH`: LMDB directory (default: ./data/cache)
    /// - `STRATUS_CACHE_MAP_SIZE_MB`: LMDB map size (default: 256)
    /// - `STRATUS_CACHE_LOCAL_MAX_ENTRIES`: local tier bound (default: 10000)
    /// - `STRATUS_CACHE_TTL_SECS`: default TTL (default: 300)
    /// - `STRATUS_CACHE_SKEW_SECS`: local expiry skew (default: 15)
    pub fn from_env() -> Self {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(env: EnvLookup<'_>) -> Self {
        let defaults = Self::default();
        Self {
            tier2_path: non_empty(env, "STRATUS_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.tier2_path),
            tier2_map_size_mb: parsed(env, "STRATUS_CACHE_MAP_SIZE_MB", defaults.tier2_map_size_mb),
            tier1_max_entries: parsed(
                env,
                "STRATUS_CACHE_LOCAL_MAX_ENTRIES",
                defaults.tier1_max_entries,
            ),
            default_ttl: Duration::from_secs(parsed(
                env,
                "STRATUS_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL_SECS,
            )),
            skew: Duration::from_secs(parsed(
                env,
                "STRATUS_CACHE_SKEW_SECS",
                TIER1_EXPIRY_SKEW_SECS,
            )),
        }
    }

    pub fn settings(&self) -> CacheSettings {
        CacheSettings::default()
            .with_default_ttl(self.default_ttl)
            .with_skew(self.skew)
    }
}

// ============================================================================
// FANOUT CONFIGURATION
// ============================================================================

/// Downstream targets. An unset URL disables that target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutConfig {
    pub search_url: Option<String>,
    pub search_index: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub notify_capacity: usize,
    pub request_timeout: Duration,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            search_url: None,
            search_index: DEFAULT_SEARCH_INDEX.to_string(),
            webhook_url: None,
            webhook_secret: None,
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
            request_timeout: Duration::from_secs(DEFAULT_FANOUT_TIMEOUT_SECS),
        }
    }
}

impl FanoutConfig {
    /// Create FanoutConfig from environment variables.
    ///
    /// - `STRATUS_SEARCH_URL`: search service base URL (unset: disabled)
    /// - `STRATUS_SEARCH_INDEX`: index name (default: users)
    /// - `STRATUS_WEBHOOK_URL`: integration event endpoint (unset: disabled)
    /// - `STRATUS_WEBHOOK_SECRET`: HMAC signing secret
    /// - `STRATUS_NOTIFY_CAPACITY`: realtime channel buffer (default: 1000)
    /// - `STRATUS_FANOUT_TIMEOUT_SECS`: outbound request timeout (default: 10)
    pub fn from_env() -> Self {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(env: EnvLookup<'_>) -> Self {
        Self {
            search_url: non_empty(env, "STRATUS_SEARCH_URL"),
            search_index: non_empty(env, "STRATUS_SEARCH_INDEX")
                .unwrap_or_else(|| DEFAULT_SEARCH_INDEX.to_string()),
            webhook_url: non_empty(env, "STRATUS_WEBHOOK_URL"),
            webhook_secret: non_empty(env, "STRATUS_WEBHOOK_SECRET"),
            notify_capacity: parsed(env, "STRATUS_NOTIFY_CAPACITY", DEFAULT_NOTIFY_CAPACITY)
                .max(1),
            request_timeout: Duration::from_secs(parsed(
                env,
                "STRATUS_FANOUT_TIMEOUT_SECS",
                DEFAULT_FANOUT_TIMEOUT_SECS,
            )),
        }
    }

    /// Reject a webhook URL without a signing secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook_url.is_some() && self.webhook_secret.is_none() {
            return Err(ConfigError::MissingRequired {
                field: "STRATUS_WEBHOOK_SECRET".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Every configuration section the service reads at startup.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub db: DbConfig,
    pub cache: CacheConfig,
    pub fanout: FanoutConfig,
    pub relay: RelayConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api: ApiConfig::from_env()?,
            db: DbConfig::from_env(),
            cache: CacheConfig::from_env(),
            fanout: FanoutConfig::from_env(),
            relay: RelayConfig::from_env(),
        })
    }
}
