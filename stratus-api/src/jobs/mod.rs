//! Background Jobs for Stratus API
//!
//! - `outbox_relay`: drains the transactional outbox into the fanout targets
//!
//! # Usage
//!
//! ```ignore
//! use stratus_api::jobs::{outbox_relay_task, OutboxRelay, RelayConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let relay = Arc::new(OutboxRelay::new(store, targets, clock, RelayConfig::from_env()));
//! let handle = tokio::spawn(outbox_relay_task(relay, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! handle.await?;
//! ```

pub mod outbox_relay;

pub use outbox_relay::{
    outbox_relay_task, CycleOutcome, CycleReport, OutboxRelay, RelayConfig, RelayMetrics,
    RelayMetricsSnapshot, RelayPhase,
};
