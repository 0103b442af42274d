//! The transactional store contract.

use async_trait::async_trait;
use stratus_core::{
    AggregateMutation, OutboxId, OutboxRecord, OutboxUpdate, StorageError, TenantScope, User,
    UserId,
};

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Primary store for user rows and the outbox.
///
/// Tenant-owned reads take an explicit [`TenantScope`]. Outbox operations are
/// tenant-agnostic: the relay scans every tenant's records.
#[async_trait]
pub trait ChangeStore: Send + Sync {
    /// Apply `mutation` and append `record` in one transaction. Either both
    /// persist or neither does.
    async fn commit_change(
        &self,
        mutation: &AggregateMutation,
        record: &OutboxRecord,
    ) -> StorageResult<()>;

    /// Fetch a user visible under `scope`.
    async fn user_get(&self, scope: TenantScope, id: UserId) -> StorageResult<Option<User>>;

    /// Up to `limit` unprocessed records, oldest `occurred_at` first.
    async fn outbox_fetch_pending(&self, limit: usize) -> StorageResult<Vec<OutboxRecord>>;

    /// Persist a batch of relay outcomes in a single commit.
    async fn outbox_apply(&self, updates: &[OutboxUpdate]) -> StorageResult<()>;

    async fn outbox_get(&self, id: OutboxId) -> StorageResult<Option<OutboxRecord>>;

    /// Number of records still awaiting dispatch.
    async fn outbox_pending_count(&self) -> StorageResult<u64>;
}
