//! Identity types for Stratus entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wrap an existing UUID.
            pub const fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// Generate a new timestamp-sortable (v7) identifier.
            pub fn now_v7() -> Self {
                Self(Uuid::now_v7())
            }

            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Tenant that owns a row, a cache entry or an outbox record.
    TenantId
);
define_id!(
    /// Identifier of a user aggregate.
    UserId
);
define_id!(
    /// Identifier of an outbox record. UUIDv7, so ids sort by creation time.
    OutboxId
);

/// Explicit tenant predicate for tenant-scoped reads.
///
/// Every read path that returns tenant-owned rows takes one of these; there is
/// no ambient filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantScope {
    tenant_id: TenantId,
}

impl TenantScope {
    pub const fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Whether a row owned by `owner` is visible under this scope.
    pub fn admits(&self, owner: TenantId) -> bool {
        self.tenant_id == owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse_and_display() {
        let id = UserId::now_v7();
        let parsed: UserId = id.to_string().parse().expect("uuid should parse");
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<TenantId>().is_err());
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = TenantId::new(Uuid::nil());
        let json = serde_json::to_string(&id).expect("serialization should succeed");
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
    }

    #[test]
    fn test_tenant_scope_admits_only_its_tenant() {
        let a = TenantId::now_v7();
        let b = TenantId::now_v7();
        let scope = TenantScope::new(a);
        assert!(scope.admits(a));
        assert!(!scope.admits(b));
    }
}
