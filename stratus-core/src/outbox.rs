//! Transactional outbox model.
//!
//! An [`OutboxRecord`] is written in the same transaction as the
//! [`AggregateMutation`] it describes. The relay later marks it processed or
//! annotates it with the last dispatch error; records are never deleted.

use crate::{OutboxId, StorageError, TenantId, Timestamp, User, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of committed change. Its string form is the outbox type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    UserCreated,
    UserUpdated,
    UserDeleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::UserCreated => "UserCreated",
            ChangeKind::UserUpdated => "UserUpdated",
            ChangeKind::UserDeleted => "UserDeleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UserCreated" => Ok(ChangeKind::UserCreated),
            "UserUpdated" => Ok(ChangeKind::UserUpdated),
            "UserDeleted" => Ok(ChangeKind::UserDeleted),
            other => Err(format!("unknown change type tag: {}", other)),
        }
    }
}

/// A durable description of a committed change awaiting propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: OutboxId,
    pub occurred_at: Timestamp,
    /// Type tag, normally a [`ChangeKind`] string.
    pub message_type: String,
    pub payload: serde_json::Value,
    pub processed_at: Option<Timestamp>,
    pub error: Option<String>,
}

impl OutboxRecord {
    /// A new pending record for `kind`.
    pub fn pending<P: Serialize>(
        kind: ChangeKind,
        payload: &P,
        occurred_at: Timestamp,
    ) -> Result<Self, StorageError> {
        let payload = serde_json::to_value(payload).map_err(|e| StorageError::Query {
            reason: format!("outbox payload serialization failed: {}", e),
        })?;
        Ok(Self {
            id: OutboxId::now_v7(),
            occurred_at,
            message_type: kind.as_str().to_string(),
            payload,
            processed_at: None,
            error: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }

    /// The parsed type tag, or `None` for tags this build does not know.
    pub fn kind(&self) -> Option<ChangeKind> {
        self.message_type.parse().ok()
    }
}

/// Per-record outcome of one relay cycle, persisted as a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboxUpdate {
    /// Dispatch succeeded; `error` keeps whatever text a prior attempt left.
    Processed { id: OutboxId, at: Timestamp },
    /// Dispatch failed; the record stays pending with `error` overwritten.
    Failed { id: OutboxId, error: String },
}

impl OutboxUpdate {
    pub fn id(&self) -> OutboxId {
        match self {
            OutboxUpdate::Processed { id, .. } | OutboxUpdate::Failed { id, .. } => *id,
        }
    }

    /// Apply this update to an in-memory copy of the record.
    pub fn apply(&self, record: &mut OutboxRecord) {
        match self {
            OutboxUpdate::Processed { at, .. } => record.processed_at = Some(*at),
            OutboxUpdate::Failed { error, .. } => record.error = Some(error.clone()),
        }
    }
}

/// A state change to the user aggregate, committed together with its outbox
/// record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateMutation {
    InsertUser(User),
    UpdateUser(User),
    DeleteUser { tenant_id: TenantId, user_id: UserId },
}

impl AggregateMutation {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            AggregateMutation::InsertUser(user) | AggregateMutation::UpdateUser(user) => {
                user.tenant_id
            }
            AggregateMutation::DeleteUser { tenant_id, .. } => *tenant_id,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            AggregateMutation::InsertUser(user) | AggregateMutation::UpdateUser(user) => user.id,
            AggregateMutation::DeleteUser { user_id, .. } => *user_id,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            AggregateMutation::InsertUser(_) => ChangeKind::UserCreated,
            AggregateMutation::UpdateUser(_) => ChangeKind::UserUpdated,
            AggregateMutation::DeleteUser { .. } => ChangeKind::UserDeleted,
        }
    }
}

/// Payload carried by a `UserDeleted` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeletedPayload {
    pub id: UserId,
    pub tenant_id: TenantId,
}
