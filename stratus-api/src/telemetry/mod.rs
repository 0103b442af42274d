//! Stratus Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the API
//! layer, the change recorder and the outbox relay.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, with_metrics, StratusMetrics, METRICS};
pub use middleware::{normalize_path, request_logging};
pub use tracer::{init_tracing, TelemetryConfig};
