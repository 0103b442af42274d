//! Prometheus Metrics Definitions
//!
//! Defines all Stratus metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_gauge_vec,
    CounterVec, Encoder, Gauge, HistogramVec, IntGaugeVec, TextEncoder,
};
use stratus_cache::{TieredCache, TieredCacheStats};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<StratusMetrics>> = Lazy::new(StratusMetrics::new);

/// Run `f` against the global metrics, if they registered.
pub fn with_metrics(f: impl FnOnce(&StratusMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Container for all Stratus metrics.
#[derive(Clone)]
pub struct StratusMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Committed changes - labels: kind
    pub changes_recorded_total: CounterVec,

    /// Outbox dispatch outcomes - labels: message_type, outcome
    pub outbox_dispatch_total: CounterVec,

    /// Relay cycles - labels: status
    pub relay_cycles_total: CounterVec,

    /// Records fetched by the most recent relay cycle
    pub relay_last_batch_size: Gauge,

    /// Cache orchestrator counters, mirrored at scrape time - labels: event
    pub cache_events: IntGaugeVec,

    /// Current active WebSocket connections
    pub websocket_connections: Gauge,
}

impl StratusMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "stratus_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "stratus_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            changes_recorded_total: register_counter_vec!(
                "stratus_changes_recorded_total",
                "Committed aggregate changes with their outbox record",
                &["kind"]
            )
            .map_err(|e| registration_error("changes_recorded_total", e))?,

            outbox_dispatch_total: register_counter_vec!(
                "stratus_outbox_dispatch_total",
                "Outbox record dispatch attempts",
                &["message_type", "outcome"]
            )
            .map_err(|e| registration_error("outbox_dispatch_total", e))?,

            relay_cycles_total: register_counter_vec!(
                "stratus_relay_cycles_total",
                "Outbox relay cycles",
                &["status"]
            )
            .map_err(|e| registration_error("relay_cycles_total", e))?,

            relay_last_batch_size: register_gauge!(
                "stratus_relay_last_batch_size",
                "Records fetched by the most recent relay cycle"
            )
            .map_err(|e| registration_error("relay_last_batch_size", e))?,

            cache_events: register_int_gauge_vec!(
                "stratus_cache_events",
                "Cumulative cache orchestrator events since startup",
                &["event"]
            )
            .map_err(|e| registration_error("cache_events", e))?,

            websocket_connections: register_gauge!(
                "stratus_websocket_connections",
                "Current number of active WebSocket connections"
            )
            .map_err(|e| registration_error("websocket_connections", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_change(&self, kind: &str) {
        self.changes_recorded_total.with_label_values(&[kind]).inc();
    }

    pub fn record_dispatch(&self, message_type: &str, success: bool) {
        let outcome = if success { "processed" } else { "failed" };
        self.outbox_dispatch_total
            .with_label_values(&[message_type, outcome])
            .inc();
    }

    pub fn record_relay_cycle(&self, success: bool, batch_size: usize) {
        let status = if success { "ok" } else { "error" };
        self.relay_cycles_total.with_label_values(&[status]).inc();
        self.relay_last_batch_size.set(batch_size as f64);
    }

    /// Mirror the orchestrator's counters.
    pub fn observe_cache(&self, stats: &TieredCacheStats) {
        let events = [
            ("local_hit", stats.local_hits),
            ("shared_hit", stats.shared_hits),
            ("load", stats.loads),
            ("empty_load", stats.empty_loads),
            ("shared_error", stats.shared_errors),
            ("local_eviction", stats.local.evictions),
        ];
        for (event, value) in events {
            self.cache_events
                .with_label_values(&[event])
                .set(value.min(i64::MAX as u64) as i64);
        }
    }

    pub fn ws_connected(&self) {
        self.websocket_connections.inc();
    }

    pub fn ws_disconnected(&self) {
        self.websocket_connections.dec();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler(State(cache): State<Arc<TieredCache>>) -> impl IntoResponse {
    with_metrics(|m| m.observe_cache(&cache.stats()));

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
