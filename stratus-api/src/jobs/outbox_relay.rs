//! Outbox Relay Background Task
//!
//! Drains the transactional outbox into the fanout targets. Each cycle:
//!
//! 1. Fetches up to `batch_size` pending records, oldest first
//! 2. Dispatches every record independently by its type tag
//! 3. Persists all per-record outcomes in a single commit
//!
//! then sleeps `poll_interval` unless shutdown is signalled. A failed record
//! stays pending with its error text and is picked up again next cycle, so
//! delivery is at-least-once and the targets must tolerate replays.
//!
//! | Type tag      | Targets, in order               |
//! |---------------|---------------------------------|
//! | `UserCreated` | index, publish, notify          |
//! | `UserUpdated` | index, publish                  |
//! | `UserDeleted` | remove from index, publish      |
//! | anything else | none; marked processed          |

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stratus_core::{
    ChangeKind, Clock, FanoutError, IntegrationEvent, Notification, OutboxRecord, OutboxUpdate,
    UserChangePayload, UserDeletedPayload, UserDocument, RELAY_BATCH_SIZE,
    RELAY_POLL_INTERVAL_SECS,
};
use stratus_storage::ChangeStore;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::{parsed, process_env, EnvLookup};
use crate::fanout::FanoutTargets;
use crate::telemetry::with_metrics;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the outbox relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Records fetched per cycle (default: 20)
    pub batch_size: usize,

    /// Pause after each cycle's commit (default: 10 seconds)
    pub poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: RELAY_BATCH_SIZE,
            poll_interval: Duration::from_secs(RELAY_POLL_INTERVAL_SECS),
        }
    }
}

impl RelayConfig {
    /// Create RelayConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `STRATUS_RELAY_BATCH_SIZE`: records per cycle (default: 20, minimum 1)
    /// - `STRATUS_RELAY_POLL_INTERVAL_SECS`: pause between cycles (default: 10, minimum 1)
    pub fn from_env() -> Self {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(env: EnvLookup<'_>) -> Self {
        Self {
            batch_size: parsed(env, "STRATUS_RELAY_BATCH_SIZE", RELAY_BATCH_SIZE).max(1),
            poll_interval: Duration::from_secs(
                parsed(env, "STRATUS_RELAY_POLL_INTERVAL_SECS", RELAY_POLL_INTERVAL_SECS).max(1),
            ),
        }
    }

}

// ============================================================================
// METRICS
// ============================================================================

/// Relay activity since startup.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Cycles run, including failed ones
    pub cycles: AtomicU64,

    /// Records marked processed
    pub records_processed: AtomicU64,

    /// Record dispatches that failed and left the record pending
    pub records_failed: AtomicU64,

    /// Fetches or batch commits that failed
    pub cycle_errors: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            records_processed: self.records_processed.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            cycle_errors: self.cycle_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayMetricsSnapshot {
    pub cycles: u64,
    pub records_processed: u64,
    pub records_failed: u64,
    pub cycle_errors: u64,
}

// ============================================================================
// CYCLE STATE
// ============================================================================

/// Where the relay is within its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelayPhase {
    Idle = 0,
    Scanning = 1,
    Dispatching = 2,
    Committing = 3,
}

impl RelayPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RelayPhase::Scanning,
            2 => RelayPhase::Dispatching,
            3 => RelayPhase::Committing,
            _ => RelayPhase::Idle,
        }
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was pending.
    Empty,
    /// Outcomes for every fetched record were persisted.
    Committed,
    /// The pending scan failed; nothing was dispatched.
    FetchFailed,
    /// Records were dispatched but their outcomes were not persisted. They
    /// stay pending and are dispatched again next cycle.
    CommitFailed,
}

/// Summary of one relay cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub processed: usize,
    pub failed: usize,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    fn empty(outcome: CycleOutcome) -> Self {
        Self {
            fetched: 0,
            processed: 0,
            failed: 0,
            outcome,
        }
    }
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error("Payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Fanout(#[from] FanoutError),
}

// ============================================================================
// RELAY
// ============================================================================

/// Dispatches pending outbox records to the fanout targets.
pub struct OutboxRelay {
    store: Arc<dyn ChangeStore>,
    targets: FanoutTargets,
    clock: Arc<dyn Clock>,
    config: RelayConfig,
    metrics: Arc<RelayMetrics>,
    phase: AtomicU8,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn ChangeStore>,
        targets: FanoutTargets,
        clock: Arc<dyn Clock>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            targets,
            clock,
            config,
            metrics: Arc::new(RelayMetrics::new()),
            phase: AtomicU8::new(RelayPhase::Idle as u8),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn phase(&self) -> RelayPhase {
        RelayPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn enter(&self, phase: RelayPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Run one scan, dispatch and commit cycle.
    ///
    /// Never fails: fetch and commit errors are logged, counted and reported
    /// in the returned [`CycleReport`].
    pub async fn run_cycle(&self) -> CycleReport {
        self.metrics.cycles.fetch_add(1, Ordering::Relaxed);

        self.enter(RelayPhase::Scanning);
        let records = match self.store.outbox_fetch_pending(self.config.batch_size).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch pending outbox records");
                self.metrics.cycle_errors.fetch_add(1, Ordering::Relaxed);
                with_metrics(|m| m.record_relay_cycle(false, 0));
                self.enter(RelayPhase::Idle);
                return CycleReport::empty(CycleOutcome::FetchFailed);
            }
        };

        if records.is_empty() {
            tracing::trace!("Outbox relay cycle found no pending records");
            with_metrics(|m| m.record_relay_cycle(true, 0));
            self.enter(RelayPhase::Idle);
            return CycleReport::empty(CycleOutcome::Empty);
        }

        self.enter(RelayPhase::Dispatching);
        let mut updates = Vec::with_capacity(records.len());
        let mut processed = 0usize;
        let mut failed = 0usize;

        for record in &records {
            let result = self.dispatch(record).await;
            with_metrics(|m| m.record_dispatch(&record.message_type, result.is_ok()));
            match result {
                Ok(()) => {
                    processed += 1;
                    updates.push(OutboxUpdate::Processed {
                        id: record.id,
                        at: self.clock.now(),
                    });
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(
                        error = %e,
                        outbox_id = %record.id,
                        message_type = %record.message_type,
                        "Failed to dispatch outbox record"
                    );
                    updates.push(OutboxUpdate::Failed {
                        id: record.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.enter(RelayPhase::Committing);
        let outcome = match self.store.outbox_apply(&updates).await {
            Ok(()) => {
                self.metrics
                    .records_processed
                    .fetch_add(processed as u64, Ordering::Relaxed);
                self.metrics
                    .records_failed
                    .fetch_add(failed as u64, Ordering::Relaxed);
                tracing::info!(
                    fetched = records.len(),
                    processed,
                    failed,
                    "Outbox relay cycle completed"
                );
                CycleOutcome::Committed
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    fetched = records.len(),
                    "Failed to persist outbox relay outcomes, batch will be retried"
                );
                self.metrics.cycle_errors.fetch_add(1, Ordering::Relaxed);
                CycleOutcome::CommitFailed
            }
        };

        with_metrics(|m| {
            m.record_relay_cycle(outcome == CycleOutcome::Committed, records.len())
        });
        self.enter(RelayPhase::Idle);

        CycleReport {
            fetched: records.len(),
            processed,
            failed,
            outcome,
        }
    }

    /// Deliver one record, stopping at the first failing target.
    async fn dispatch(&self, record: &OutboxRecord) -> Result<(), DispatchError> {
        let Some(kind) = record.kind() else {
            tracing::warn!(
                outbox_id = %record.id,
                message_type = %record.message_type,
                "Unknown outbox message type, marking processed"
            );
            return Ok(());
        };

        match kind {
            ChangeKind::UserCreated | ChangeKind::UserUpdated => {
                let payload: UserChangePayload = serde_json::from_value(record.payload.clone())?;
                self.targets
                    .indexer
                    .index(&UserDocument::from(&payload))
                    .await?;
                self.targets
                    .publisher
                    .publish(&IntegrationEvent {
                        event_id: record.id,
                        event_type: kind,
                        tenant_id: payload.tenant_id,
                        user_id: payload.id,
                        occurred_at: record.occurred_at,
                        email: Some(payload.email.clone()),
                        full_name: Some(payload.full_name()),
                    })
                    .await?;
                if kind == ChangeKind::UserCreated {
                    self.targets
                        .notifier
                        .notify(&Notification {
                            tenant_id: payload.tenant_id,
                            subject_id: payload.id,
                            description: payload.full_name(),
                        })
                        .await?;
                }
            }
            ChangeKind::UserDeleted => {
                let payload: UserDeletedPayload = serde_json::from_value(record.payload.clone())?;
                self.targets
                    .indexer
                    .remove(payload.tenant_id, payload.id)
                    .await?;
                self.targets
                    .publisher
                    .publish(&IntegrationEvent {
                        event_id: record.id,
                        event_type: kind,
                        tenant_id: payload.tenant_id,
                        user_id: payload.id,
                        occurred_at: record.occurred_at,
                        email: None,
                        full_name: None,
                    })
                    .await?;
            }
        }

        tracing::debug!(outbox_id = %record.id, message_type = %kind, "Outbox record dispatched");
        Ok(())
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run relay cycles until shutdown is signalled.
///
/// The shutdown flag is checked before every cycle and raced against the
/// pause between cycles; a cycle in flight always finishes its commit.
/// Dropping the sender also stops the task.
pub async fn outbox_relay_task(
    relay: Arc<OutboxRelay>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<RelayMetrics> {
    tracing::info!(
        batch_size = relay.config().batch_size,
        poll_interval_secs = relay.config().poll_interval.as_secs(),
        "Outbox relay started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        relay.run_cycle().await;

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(relay.config().poll_interval) => {}
        }
    }

    let metrics = relay.metrics();
    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        records_processed = snapshot.records_processed,
        records_failed = snapshot.records_failed,
        cycle_errors = snapshot.cycle_errors,
        "Outbox relay stopped"
    );
    metrics
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::collections::HashMap;
    use stratus_core::{ManualClock, TenantId};
    use stratus_test_utils::{
        fixtures, InMemoryStore, RecordingIndexer, RecordingNotifier, RecordingPublisher,
    };

    struct Harness {
        store: Arc<InMemoryStore>,
        indexer: Arc<RecordingIndexer>,
        publisher: Arc<RecordingPublisher>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
        relay: Arc<OutboxRelay>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let indexer = Arc::new(RecordingIndexer::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new(fixtures::fixed_start()));
        let relay = Arc::new(OutboxRelay::new(
            store.clone(),
            FanoutTargets::new(indexer.clone(), publisher.clone(), notifier.clone()),
            clock.clone(),
            RelayConfig::default(),
        ));
        Harness {
            store,
            indexer,
            publisher,
            notifier,
            clock,
            relay,
        }
    }

    async fn seed(h: &Harness, count: usize) -> Vec<(stratus_core::User, OutboxRecord)> {
        let seeded = fixtures::pending_created_records(
            TenantId::now_v7(),
            count,
            fixtures::fixed_start() - TimeDelta::hours(1),
        );
        for (_, record) in &seeded {
            h.store.seed_outbox(record.clone()).await;
        }
        seeded
    }

    #[test]
    fn test_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("STRATUS_RELAY_BATCH_SIZE", "0"),
            ("STRATUS_RELAY_POLL_INTERVAL_SECS", "3"),
        ]
        .into_iter()
        .collect();
        let lookup = |key: &str| vars.get(key).map(|v| v.to_string());
        let config = RelayConfig::from_lookup(&lookup);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.poll_interval, Duration::from_secs(3));

        let none = |_: &str| None;
        assert_eq!(RelayConfig::from_lookup(&none), RelayConfig::default());
    }

    #[test]
    fn test_zero_poll_interval_is_raised_to_one_second() {
        let lookup = |key: &str| {
            (key == "STRATUS_RELAY_POLL_INTERVAL_SECS").then(|| "0".to_string())
        };
        let config = RelayConfig::from_lookup(&lookup);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 20);
    }

    #[tokio::test]
    async fn test_cycle_processes_oldest_batch_only() {
        let h = harness();
        let seeded = seed(&h, 25).await;

        let report = h.relay.run_cycle().await;
        assert_eq!(report.fetched, 20);
        assert_eq!(report.processed, 20);
        assert_eq!(report.outcome, CycleOutcome::Committed);

        let records = h.store.outbox_all().await;
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.id, seeded[i].1.id);
            assert_eq!(record.is_pending(), i >= 20, "record {} pending state", i);
        }
        assert_eq!(h.store.outbox_pending_count().await.expect("count"), 5);
        assert_eq!(h.indexer.indexed().len(), 20);
        assert_eq!(h.relay.phase(), RelayPhase::Idle);
    }

    #[tokio::test]
    async fn test_processed_at_comes_from_clock() {
        let h = harness();
        seed(&h, 1).await;
        h.clock.advance(Duration::from_secs(42));

        h.relay.run_cycle().await;

        let record = &h.store.outbox_all().await[0];
        assert_eq!(
            record.processed_at,
            Some(fixtures::fixed_start() + TimeDelta::seconds(42))
        );
    }

    #[tokio::test]
    async fn test_failed_record_stays_pending_and_is_retried() {
        let h = harness();
        let seeded = seed(&h, 1).await;
        let (user, record) = &seeded[0];
        h.indexer.fail_for(user.id);

        let report = h.relay.run_cycle().await;
        assert_eq!(report.failed, 1);
        let stored = h
            .store
            .outbox_get(record.id)
            .await
            .expect("get")
            .expect("record exists");
        assert!(stored.is_pending());
        let error = stored.error.expect("error text recorded");
        assert!(error.contains("search-index"), "unexpected error: {}", error);

        h.indexer.clear_failures();
        let report = h.relay.run_cycle().await;
        assert_eq!(report.fetched, 1);
        assert_eq!(report.processed, 1);

        let stored = h
            .store
            .outbox_get(record.id)
            .await
            .expect("get")
            .expect("record exists");
        assert!(!stored.is_pending());
        assert!(stored.error.is_some());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_the_batch() {
        let h = harness();
        let seeded = seed(&h, 3).await;
        h.publisher.fail_for(seeded[1].0.id);

        let report = h.relay.run_cycle().await;
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);

        let records = h.store.outbox_all().await;
        assert!(!records[0].is_pending());
        assert!(records[1].is_pending());
        assert!(!records[2].is_pending());

        let snapshot = h.relay.metrics().snapshot();
        assert_eq!(snapshot.records_processed, 2);
        assert_eq!(snapshot.records_failed, 1);
    }

    #[tokio::test]
    async fn test_targets_stop_at_first_failure() {
        let h = harness();
        let seeded = seed(&h, 1).await;
        h.indexer.fail_for(seeded[0].0.id);

        h.relay.run_cycle().await;

        assert!(h.publisher.published().is_empty());
        assert!(h.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_type() {
        let h = harness();
        let tenant = TenantId::now_v7();
        let created = fixtures::user_in(tenant, "Ada");
        let updated = fixtures::user_in(tenant, "Grace");
        let deleted = fixtures::user_in(tenant, "Alan");
        let start = fixtures::fixed_start();

        h.store
            .seed_outbox(fixtures::pending_record(&created, ChangeKind::UserCreated, start))
            .await;
        h.store
            .seed_outbox(fixtures::pending_record(
                &updated,
                ChangeKind::UserUpdated,
                start + TimeDelta::seconds(1),
            ))
            .await;
        let delete_payload = UserDeletedPayload {
            id: deleted.id,
            tenant_id: tenant,
        };
        let delete_record = OutboxRecord::pending(
            ChangeKind::UserDeleted,
            &delete_payload,
            start + TimeDelta::seconds(2),
        )
        .expect("payload should serialize");
        h.store.seed_outbox(delete_record.clone()).await;

        let report = h.relay.run_cycle().await;
        assert_eq!(report.processed, 3);

        let indexed: Vec<_> = h.indexer.indexed().iter().map(|d| d.id).collect();
        assert_eq!(indexed, vec![created.id, updated.id]);
        assert_eq!(h.indexer.removed(), vec![deleted.id]);

        let published = h.publisher.published();
        let types: Vec<_> = published.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                ChangeKind::UserCreated,
                ChangeKind::UserUpdated,
                ChangeKind::UserDeleted
            ]
        );
        assert_eq!(published[2].event_id, delete_record.id);
        assert!(published[2].email.is_none());

        let notifications = h.notifier.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].subject_id, created.id);
        assert_eq!(notifications[0].description, created.full_name());
    }

    #[tokio::test]
    async fn test_unknown_type_is_marked_processed() {
        let h = harness();
        let user = fixtures::user_in(TenantId::now_v7(), "Ada");
        let mut record = fixtures::pending_record(&user, ChangeKind::UserCreated, fixtures::fixed_start());
        record.message_type = "OrderPlaced".to_string();
        h.store.seed_outbox(record.clone()).await;

        let report = h.relay.run_cycle().await;
        assert_eq!(report.processed, 1);
        assert!(h.indexer.indexed().is_empty());
        assert!(h.publisher.published().is_empty());
        let stored = h.store.outbox_get(record.id).await.expect("get").expect("exists");
        assert!(!stored.is_pending());
    }

    #[tokio::test]
    async fn test_undecodable_payload_fails_record() {
        let h = harness();
        let user = fixtures::user_in(TenantId::now_v7(), "Ada");
        let mut record = fixtures::pending_record(&user, ChangeKind::UserUpdated, fixtures::fixed_start());
        record.payload = serde_json::json!({ "unexpected": true });
        h.store.seed_outbox(record.clone()).await;

        let report = h.relay.run_cycle().await;
        assert_eq!(report.failed, 1);
        let stored = h.store.outbox_get(record.id).await.expect("get").expect("exists");
        assert!(stored.is_pending());
        assert!(stored
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("Payload decode failed")));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_survived() {
        let h = harness();
        seed(&h, 2).await;
        h.store.fail_next_fetches(1);

        let report = h.relay.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::FetchFailed);
        assert!(h.indexer.indexed().is_empty());

        let report = h.relay.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Committed);
        assert_eq!(report.processed, 2);
        assert_eq!(h.relay.metrics().snapshot().cycle_errors, 1);
    }

    #[tokio::test]
    async fn test_commit_failure_redelivers_batch() {
        let h = harness();
        seed(&h, 2).await;
        h.store.fail_next_applies(1);

        let report = h.relay.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::CommitFailed);
        assert_eq!(h.store.outbox_pending_count().await.expect("count"), 2);
        assert!(h.store.outbox_all().await.iter().all(|r| r.error.is_none()));

        let report = h.relay.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Committed);
        assert_eq!(h.store.outbox_pending_count().await.expect("count"), 0);
        // At-least-once: both records reached the index twice.
        assert_eq!(h.indexer.indexed().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_cycle_commits_nothing() {
        let h = harness();
        h.store.fail_next_applies(1);

        let report = h.relay.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Empty);

        // The injected apply failure is still armed.
        seed(&h, 1).await;
        assert_eq!(h.relay.run_cycle().await.outcome, CycleOutcome::CommitFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_waits_between_cycles_and_stops_on_shutdown() {
        let h = harness();
        seed(&h, 1).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(outbox_relay_task(Arc::clone(&h.relay), shutdown_rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.relay.metrics().snapshot().cycles, 1);
        assert_eq!(h.store.outbox_pending_count().await.expect("count"), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.relay.metrics().snapshot().cycles, 2);

        shutdown_tx.send(true).expect("relay should be listening");
        let metrics = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay should stop promptly")
            .expect("relay task should not panic");
        assert_eq!(metrics.snapshot().cycles, 2);
    }

    #[tokio::test]
    async fn test_task_exits_immediately_when_already_shut_down() {
        let h = harness();
        seed(&h, 1).await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);

        let metrics = outbox_relay_task(Arc::clone(&h.relay), shutdown_rx).await;
        assert_eq!(metrics.snapshot().cycles, 0);
        assert_eq!(h.store.outbox_pending_count().await.expect("count"), 1);
    }
}
