//! Tenant-scoped cache keys.
//!
//! A [`CacheKey`] can only be built from a tenant, an entity kind and an
//! identifier, so every cached value is bound to exactly one tenant. The
//! rendered form is `"<tenant>:<kind>-<id>"`, for example
//! `"0191...:user-0192..."`.

use crate::TenantId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Separator between the tenant prefix and the entity part of a key.
const TENANT_SEPARATOR: char = ':';

/// Kinds of cacheable entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(EntityKind::User),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

/// A cache key scoped to a single tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    rendered: String,
    tenant_id: TenantId,
}

impl CacheKey {
    /// Build the key for one entity of one tenant.
    pub fn new(tenant_id: TenantId, kind: EntityKind, id: impl Into<Uuid>) -> Self {
        let id: Uuid = id.into();
        Self {
            rendered: format!("{}{}{}-{}", tenant_id, TENANT_SEPARATOR, kind, id),
            tenant_id,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The `"<kind>-<id>"` part without the tenant prefix.
    pub fn entity_part(&self) -> &str {
        self.rendered
            .split_once(TENANT_SEPARATOR)
            .map(|(_, rest)| rest)
            .unwrap_or(&self.rendered)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}
