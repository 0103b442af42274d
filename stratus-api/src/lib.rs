//! Stratus API - HTTP Service, Change Recorder and Outbox Relay
//!
//! Composes the tiered cache, the primary store and the fanout targets into
//! a multi-tenant user service. Writes commit together with an outbox record
//! through [`recorder::ChangeRecorder`]; the [`jobs::OutboxRelay`] later
//! propagates each record to the search index, the integration webhook and
//! connected websocket clients.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod events;
pub mod fanout;
pub mod jobs;
pub mod middleware;
pub mod recorder;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod ws;

// Re-export commonly used types
pub use config::{ApiConfig, AppConfig, CacheConfig, FanoutConfig, StoreBackend};
pub use db::{DbConfig, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use events::{ChangeSubscriber, ChangeSubscribers, LoggingSubscriber, MetricsSubscriber};
pub use fanout::{BroadcastNotifier, FanoutTargets, HttpSearchIndexer, WebhookPublisher};
pub use jobs::{outbox_relay_task, OutboxRelay, RelayConfig};
pub use middleware::{CorrelationId, TenantContext};
pub use recorder::{user_cache_key, ChangeRecorder};
pub use routes::{create_api_router, RouteLogging};
pub use state::{build_app_state, AppState};
