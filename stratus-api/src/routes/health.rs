//! `GET /health`
//!
//! Checks the primary store by counting the outbox backlog; a failed check
//! turns the whole report unhealthy (503). Cache counters are informational.
//! No tenant header required.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use stratus_cache::{TieredCache, TieredCacheStats};
use stratus_storage::ChangeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of the store check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreCheck {
    pub reachable: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheCounters {
    pub local_hits: u64,
    pub shared_hits: u64,
    pub loads: u64,
    pub shared_errors: u64,
}

impl From<TieredCacheStats> for CacheCounters {
    fn from(stats: TieredCacheStats) -> Self {
        Self {
            local_hits: stats.local_hits,
            shared_hits: stats.shared_hits,
            loads: stats.loads,
            shared_errors: stats.shared_errors,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub store: StoreCheck,
    /// Outbox records awaiting dispatch; absent when the check failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox_pending: Option<u64>,
    pub cache: CacheCounters,
    pub version: String,
    pub uptime_seconds: u64,
}

pub struct HealthState {
    store: Arc<dyn ChangeStore>,
    cache: Arc<TieredCache>,
    started: Instant,
}

impl HealthState {
    pub fn new(store: Arc<dyn ChangeStore>, cache: Arc<TieredCache>) -> Self {
        Self {
            store,
            cache,
            started: Instant::now(),
        }
    }

    async fn report(&self) -> HealthReport {
        let check_start = Instant::now();
        let check = self.store.outbox_pending_count().await;
        let latency_ms = check_start.elapsed().as_millis() as u64;

        let (status, store, outbox_pending) = match check {
            Ok(pending) => (
                HealthStatus::Healthy,
                StoreCheck {
                    reachable: true,
                    latency_ms,
                    error: None,
                },
                Some(pending),
            ),
            Err(e) => {
                tracing::warn!(error = %e, latency_ms, "Store health check failed");
                (
                    HealthStatus::Unhealthy,
                    StoreCheck {
                        reachable: false,
                        latency_ms,
                        error: Some(e.to_string()),
                    },
                    None,
                )
            }
        };

        HealthReport {
            status,
            store,
            outbox_pending,
            cache: self.cache.stats().into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }
}

async fn health(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<HealthReport>) {
    let report = state.report().await;
    let code = match report.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(report))
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}
