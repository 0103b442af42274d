//! Stratus Test Utilities
//!
//! Shared test infrastructure for the Stratus workspace:
//! - Recording fakes for the fanout targets, with per-user failure injection
//! - Proptest generators for users and outbox records
//! - Fixtures for common scenarios

pub use stratus_storage::InMemoryStore;

pub use stratus_core::{
    AggregateMutation, ChangeKind, FanoutError, IntegrationEvent, ManualClock, NewUser,
    Notification, OutboxRecord, TenantId, TenantScope, Timestamp, User, UserDocument, UserId,
};

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use stratus_core::{MessagePublisher, RealtimeNotifier, SearchIndexer};

// ============================================================================
// FAKE FANOUT TARGETS
// ============================================================================

/// Users for which a fake should fail, or every call when `all` is set.
#[derive(Debug, Default)]
struct FailurePlan {
    users: Mutex<HashSet<UserId>>,
    all: Mutex<bool>,
}

impl FailurePlan {
    fn fail_for(&self, id: UserId) {
        lock(&self.users).insert(id);
    }

    fn fail_all(&self, fail: bool) {
        *lock(&self.all) = fail;
    }

    fn clear(&self) {
        lock(&self.users).clear();
        *lock(&self.all) = false;
    }

    fn check(&self, target: &'static str, id: UserId) -> Result<(), FanoutError> {
        if *lock(&self.all) || lock(&self.users).contains(&id) {
            return Err(FanoutError::Rejected {
                target,
                status: 503,
                reason: format!("injected failure for {}", id),
            });
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Search indexer that records every call.
#[derive(Debug, Default)]
pub struct RecordingIndexer {
    indexed: Mutex<Vec<UserDocument>>,
    removed: Mutex<Vec<UserId>>,
    failures: FailurePlan,
}

impl RecordingIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, id: UserId) {
        self.failures.fail_for(id);
    }

    pub fn fail_all(&self, fail: bool) {
        self.failures.fail_all(fail);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Documents successfully indexed, in call order.
    pub fn indexed(&self) -> Vec<UserDocument> {
        lock(&self.indexed).clone()
    }

    pub fn removed(&self) -> Vec<UserId> {
        lock(&self.removed).clone()
    }
}

#[async_trait]
impl SearchIndexer for RecordingIndexer {
    async fn index(&self, document: &UserDocument) -> Result<(), FanoutError> {
        self.failures.check("search-index", document.id)?;
        lock(&self.indexed).push(document.clone());
        Ok(())
    }

    async fn remove(&self, _tenant_id: TenantId, id: UserId) -> Result<(), FanoutError> {
        self.failures.check("search-index", id)?;
        lock(&self.removed).push(id);
        Ok(())
    }
}

/// Message publisher that records every published event.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<IntegrationEvent>>,
    failures: FailurePlan,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, id: UserId) {
        self.failures.fail_for(id);
    }

    pub fn fail_all(&self, fail: bool) {
        self.failures.fail_all(fail);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    pub fn published(&self) -> Vec<IntegrationEvent> {
        lock(&self.published).clone()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, event: &IntegrationEvent) -> Result<(), FanoutError> {
        self.failures.check("message-bus", event.user_id)?;
        lock(&self.published).push(event.clone());
        Ok(())
    }
}

/// Realtime notifier that records every notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failures: FailurePlan,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, id: UserId) {
        self.failures.fail_for(id);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl RealtimeNotifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), FanoutError> {
        self.failures.check("realtime", notification.subject_id)?;
        lock(&self.sent).push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Stratus types.

    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        arb_uuid().prop_map(TenantId::new)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_uuid().prop_map(UserId::new)
    }

    fn arb_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{1,11}"
    }

    pub fn arb_date_of_birth() -> impl Strategy<Value = NaiveDate> {
        (1940i32..2010, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default())
    }

    /// Generate a valid creation request.
    pub fn arb_new_user() -> impl Strategy<Value = NewUser> {
        (arb_name(), arb_name(), "[a-z]{1,10}", arb_date_of_birth()).prop_map(
            |(first_name, last_name, local, date_of_birth)| NewUser {
                email: format!("{}@example.com", local),
                first_name,
                last_name,
                date_of_birth,
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;
    use chrono::{DateTime, NaiveDate, TimeDelta};

    /// A whole-second start time, so millisecond truncation never matters.
    pub fn fixed_start() -> Timestamp {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
    }

    pub fn new_user_input(first_name: &str, last_name: &str) -> NewUser {
        NewUser {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: format!(
                "{}.{}@example.com",
                first_name.to_lowercase(),
                last_name.to_lowercase()
            ),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 6, 15).unwrap_or_default(),
        }
    }

    /// A user row owned by `tenant_id`.
    pub fn user_in(tenant_id: TenantId, first_name: &str) -> User {
        new_user_input(first_name, "Tester").into_user(tenant_id, fixed_start())
    }

    /// A pending record describing `user`.
    pub fn pending_record(user: &User, kind: ChangeKind, occurred_at: Timestamp) -> OutboxRecord {
        let payload = serde_json::to_value(user.change_payload()).unwrap_or_default();
        OutboxRecord {
            id: stratus_core::OutboxId::now_v7(),
            occurred_at,
            message_type: kind.as_str().to_string(),
            payload,
            processed_at: None,
            error: None,
        }
    }

    /// `count` pending `UserCreated` records one second apart, oldest first,
    /// with the users they describe.
    pub fn pending_created_records(
        tenant_id: TenantId,
        count: usize,
        start: Timestamp,
    ) -> Vec<(User, OutboxRecord)> {
        (0..count)
            .map(|i| {
                let user = user_in(tenant_id, &format!("User{}", i));
                let record = pending_record(
                    &user,
                    ChangeKind::UserCreated,
                    start + TimeDelta::seconds(i as i64),
                );
                (user, record)
            })
            .collect()
    }
}
