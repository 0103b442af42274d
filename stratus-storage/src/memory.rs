//! In-memory [`ChangeStore`] for tests and single-process deployments.
//!
//! A single write lock covers each commit, so a mutation and its outbox
//! record land together or not at all. Faults can be scheduled to exercise
//! failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use stratus_core::{
    AggregateMutation, EntityKind, OutboxId, OutboxRecord, OutboxUpdate, StorageError,
    TenantScope, User, UserId,
};
use tokio::sync::RwLock;

use crate::store::{ChangeStore, StorageResult};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    outbox: HashMap<OutboxId, OutboxRecord>,
}

/// Scheduled failures, each consumed by the next matching call.
#[derive(Debug, Default)]
struct Faults {
    commits: AtomicU32,
    fetches: AtomicU32,
    applies: AtomicU32,
}

fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Map-backed store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    faults: Faults,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail before touching any state.
    pub fn fail_next_commits(&self, n: u32) {
        self.faults.commits.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` pending-record fetches fail.
    pub fn fail_next_fetches(&self, n: u32) {
        self.faults.fetches.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` batch applies fail without applying anything.
    pub fn fail_next_applies(&self, n: u32) {
        self.faults.applies.store(n, Ordering::SeqCst);
    }

    /// Insert an outbox record directly, bypassing a mutation.
    pub async fn seed_outbox(&self, record: OutboxRecord) {
        self.state.write().await.outbox.insert(record.id, record);
    }

    /// Every outbox record, oldest first.
    pub async fn outbox_all(&self) -> Vec<OutboxRecord> {
        let state = self.state.read().await;
        let mut records: Vec<OutboxRecord> = state.outbox.values().cloned().collect();
        records.sort_by(|a, b| (a.occurred_at, a.id).cmp(&(b.occurred_at, b.id)));
        records
    }

    pub async fn user_count(&self) -> usize {
        self.state.read().await.users.len()
    }
}

fn not_found(id: UserId) -> StorageError {
    StorageError::NotFound {
        kind: EntityKind::User,
        id: id.as_uuid(),
    }
}

impl State {
    /// Check that `mutation` can be applied without changing anything.
    fn check(&self, mutation: &AggregateMutation) -> StorageResult<()> {
        match mutation {
            AggregateMutation::InsertUser(user) => {
                if self.users.contains_key(&user.id) {
                    return Err(StorageError::AlreadyExists {
                        kind: EntityKind::User,
                        id: user.id.as_uuid(),
                    });
                }
            }
            AggregateMutation::UpdateUser(user) => {
                self.owned_user(user.tenant_id, user.id)?;
            }
            AggregateMutation::DeleteUser { tenant_id, user_id } => {
                self.owned_user(*tenant_id, *user_id)?;
            }
        }
        Ok(())
    }

    fn owned_user(&self, tenant_id: stratus_core::TenantId, id: UserId) -> StorageResult<&User> {
        self.users
            .get(&id)
            .filter(|user| user.tenant_id == tenant_id)
            .ok_or_else(|| not_found(id))
    }

    fn apply(&mut self, mutation: &AggregateMutation) {
        match mutation {
            AggregateMutation::InsertUser(user) | AggregateMutation::UpdateUser(user) => {
                self.users.insert(user.id, user.clone());
            }
            AggregateMutation::DeleteUser { user_id, .. } => {
                self.users.remove(user_id);
            }
        }
    }
}

#[async_trait]
impl ChangeStore for InMemoryStore {
    async fn commit_change(
        &self,
        mutation: &AggregateMutation,
        record: &OutboxRecord,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;

        if take_fault(&self.faults.commits) {
            tracing::debug!(outbox_id = %record.id, "Injected commit failure");
            return Err(StorageError::TransactionFailed {
                reason: "injected commit failure".to_string(),
            });
        }
        state.check(mutation)?;
        if state.outbox.contains_key(&record.id) {
            return Err(StorageError::TransactionFailed {
                reason: format!("duplicate outbox id {}", record.id),
            });
        }

        state.apply(mutation);
        state.outbox.insert(record.id, record.clone());
        tracing::trace!(
            kind = mutation.kind().as_str(),
            outbox_id = %record.id,
            "Change committed"
        );
        Ok(())
    }

    async fn user_get(&self, scope: TenantScope, id: UserId) -> StorageResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&id)
            .filter(|user| scope.admits(user.tenant_id))
            .cloned())
    }

    async fn outbox_fetch_pending(&self, limit: usize) -> StorageResult<Vec<OutboxRecord>> {
        if take_fault(&self.faults.fetches) {
            tracing::debug!(limit, "Injected fetch failure");
            return Err(StorageError::Connection {
                reason: "injected fetch failure".to_string(),
            });
        }
        let state = self.state.read().await;
        let mut pending: Vec<OutboxRecord> = state
            .outbox
            .values()
            .filter(|record| record.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| (a.occurred_at, a.id).cmp(&(b.occurred_at, b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn outbox_apply(&self, updates: &[OutboxUpdate]) -> StorageResult<()> {
        let mut state = self.state.write().await;

        if take_fault(&self.faults.applies) {
            tracing::debug!(updates = updates.len(), "Injected batch commit failure");
            return Err(StorageError::TransactionFailed {
                reason: "injected batch commit failure".to_string(),
            });
        }
        if let Some(missing) = updates
            .iter()
            .find(|update| !state.outbox.contains_key(&update.id()))
        {
            return Err(StorageError::TransactionFailed {
                reason: format!("unknown outbox record {}", missing.id()),
            });
        }

        for update in updates {
            if let Some(record) = state.outbox.get_mut(&update.id()) {
                update.apply(record);
            }
        }
        Ok(())
    }

    async fn outbox_get(&self, id: OutboxId) -> StorageResult<Option<OutboxRecord>> {
        Ok(self.state.read().await.outbox.get(&id).cloned())
    }

    async fn outbox_pending_count(&self) -> StorageResult<u64> {
        let state = self.state.read().await;
        Ok(state.outbox.values().filter(|r| r.is_pending()).count() as u64)
    }
}
