//! Change Recorder
//!
//! Every user write goes through [`ChangeRecorder`]: the aggregate mutation
//! and its outbox record commit in one store transaction, and only after that
//! commit succeeds are subscribers notified and the cached view invalidated.
//! A failed commit leaves no trace: no row change, no outbox record, no event.

use std::sync::Arc;

use stratus_cache::TieredCache;
use stratus_core::{
    AggregateMutation, CacheKey, ChangeKind, Clock, DomainChangeEvent, EntityKind, EntityRef,
    NewUser, OutboxRecord, StorageError, TenantId, TenantScope, User, UserDeletedPayload,
    UserId, UserPatch,
};
use stratus_storage::ChangeStore;

use crate::error::{ApiError, ApiResult};
use crate::events::ChangeSubscribers;

/// Cache key of a user's read projection.
pub fn user_cache_key(tenant_id: TenantId, id: UserId) -> CacheKey {
    CacheKey::new(tenant_id, EntityKind::User, id.as_uuid())
}

/// Records user changes atomically with their outbox records.
pub struct ChangeRecorder {
    store: Arc<dyn ChangeStore>,
    cache: Arc<TieredCache>,
    subscribers: ChangeSubscribers,
    clock: Arc<dyn Clock>,
}

impl ChangeRecorder {
    pub fn new(
        store: Arc<dyn ChangeStore>,
        cache: Arc<TieredCache>,
        subscribers: ChangeSubscribers,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache,
            subscribers,
            clock,
        }
    }

    /// Create a user in `scope`'s tenant.
    pub async fn create_user(&self, scope: TenantScope, input: NewUser) -> ApiResult<User> {
        input.validate()?;
        let user = input.into_user(scope.tenant_id(), self.clock.now());
        let record = OutboxRecord::pending(
            ChangeKind::UserCreated,
            &user.change_payload(),
            user.created_at,
        )?;

        self.record(AggregateMutation::InsertUser(user.clone()), record)
            .await?;
        Ok(user)
    }

    /// Apply `patch` to a user of `scope`'s tenant.
    pub async fn update_user(
        &self,
        scope: TenantScope,
        id: UserId,
        patch: UserPatch,
    ) -> ApiResult<User> {
        patch.validate()?;
        if patch.is_empty() {
            return Err(ApiError::validation_failed("At least one field must be updated"));
        }

        let current = self
            .store
            .user_get(scope, id)
            .await?
            .ok_or_else(|| ApiError::entity_not_found("User", id))?;

        let updated = patch.apply_to(&current, self.clock.now());
        let record = OutboxRecord::pending(
            ChangeKind::UserUpdated,
            &updated.change_payload(),
            updated.updated_at,
        )?;

        self.record(AggregateMutation::UpdateUser(updated.clone()), record)
            .await?;
        Ok(updated)
    }

    /// Delete a user of `scope`'s tenant.
    pub async fn delete_user(&self, scope: TenantScope, id: UserId) -> ApiResult<()> {
        let tenant_id = scope.tenant_id();
        let payload = UserDeletedPayload { id, tenant_id };
        let record = OutboxRecord::pending(ChangeKind::UserDeleted, &payload, self.clock.now())?;

        self.record(
            AggregateMutation::DeleteUser {
                tenant_id,
                user_id: id,
            },
            record,
        )
        .await
        .map_err(|e| match e {
            StorageError::NotFound { .. } => ApiError::entity_not_found("User", id),
            other => other.into(),
        })?;
        Ok(())
    }

    /// Commit `mutation` with `record`, then notify and invalidate.
    pub async fn record(
        &self,
        mutation: AggregateMutation,
        record: OutboxRecord,
    ) -> Result<DomainChangeEvent, StorageError> {
        let kind = mutation.kind();
        let tenant_id = mutation.tenant_id();
        let user_id = mutation.user_id();

        if let Err(e) = self.store.commit_change(&mutation, &record).await {
            tracing::warn!(
                error = %e,
                kind = %kind,
                tenant_id = %tenant_id,
                user_id = %user_id,
                "Change commit failed"
            );
            return Err(e);
        }

        let event = DomainChangeEvent::committed(
            kind,
            tenant_id,
            EntityRef {
                kind: EntityKind::User,
                id: user_id.as_uuid(),
            },
            &record,
        );
        self.subscribers.publish(&event);

        // The write is durable at this point; a stale cache entry only lives
        // until its TTL runs out.
        let key = user_cache_key(tenant_id, user_id);
        if let Err(e) = self.cache.remove(&key).await {
            tracing::warn!(error = %e, key = %key, "Cache invalidation failed after commit");
        }

        Ok(event)
    }
}
