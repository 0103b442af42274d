//! In-process change notifications.

use crate::{ChangeKind, EntityKind, OutboxId, OutboxRecord, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to the entity a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

/// Raised to in-process subscribers once a mutation and its outbox record have
/// committed. Never raised for a rolled-back change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainChangeEvent {
    pub event_id: Uuid,
    pub kind: ChangeKind,
    pub tenant_id: TenantId,
    pub entity: EntityRef,
    pub outbox_id: OutboxId,
    pub occurred_at: Timestamp,
    pub payload: serde_json::Value,
}

impl DomainChangeEvent {
    /// Describe the committed `record`.
    pub fn committed(
        kind: ChangeKind,
        tenant_id: TenantId,
        entity: EntityRef,
        record: &OutboxRecord,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            kind,
            tenant_id,
            entity,
            outbox_id: record.id,
            occurred_at: record.occurred_at,
            payload: record.payload.clone(),
        }
    }
}
