//! Downstream fanout contracts.
//!
//! The outbox relay delivers each committed change to a search index, a
//! message publisher and a realtime notifier. Delivery is at-least-once: a
//! record whose batch commit fails is dispatched again, so every target must
//! tolerate replays of the same call.

use crate::{ChangeKind, FanoutError, OutboxId, TenantId, Timestamp, UserChangePayload, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Document upserted into the search index, keyed by user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDocument {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
}

impl From<&UserChangePayload> for UserDocument {
    fn from(payload: &UserChangePayload) -> Self {
        Self {
            id: payload.id,
            tenant_id: payload.tenant_id,
            first_name: payload.first_name.clone(),
            last_name: payload.last_name.clone(),
            full_name: payload.full_name(),
            email: payload.email.clone(),
        }
    }
}

/// Message published to the integration bus.
///
/// `event_id` is the outbox record id, so consumers can drop duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationEvent {
    pub event_id: OutboxId,
    pub event_type: ChangeKind,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Realtime notification pushed to connected clients of a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub tenant_id: TenantId,
    pub subject_id: UserId,
    pub description: String,
}

/// Writes documents into the search index. Upserts by id.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn index(&self, document: &UserDocument) -> Result<(), FanoutError>;

    /// Remove a document. Removing an absent document succeeds.
    async fn remove(&self, tenant_id: TenantId, id: UserId) -> Result<(), FanoutError>;
}

/// Publishes integration events to the message bus.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, event: &IntegrationEvent) -> Result<(), FanoutError>;
}

/// Pushes notifications to live clients.
#[async_trait]
pub trait RealtimeNotifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), FanoutError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_from_payload() {
        let payload = UserChangePayload {
            id: UserId::now_v7(),
            tenant_id: TenantId::now_v7(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: "grace@example.com".to_string(),
        };
        let doc = UserDocument::from(&payload);
        assert_eq!(doc.id, payload.id);
        assert_eq!(doc.full_name, "Grace Hopper");
    }

    #[test]
    fn test_integration_event_omits_absent_fields() {
        let event = IntegrationEvent {
            event_id: OutboxId::now_v7(),
            event_type: ChangeKind::UserDeleted,
            tenant_id: TenantId::now_v7(),
            user_id: UserId::now_v7(),
            occurred_at: chrono::Utc::now(),
            email: None,
            full_name: None,
        };
        let json = serde_json::to_value(&event).expect("serialization should succeed");
        assert_eq!(json["event_type"], "UserDeleted");
        assert!(json.get("email").is_none());
    }
}
