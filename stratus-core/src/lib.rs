//! Stratus Core - Entity Types
//!
//! Data types shared by every Stratus crate: identifiers, the user aggregate,
//! the outbox model, change events, cache keys, fanout contracts and errors.

pub mod cache_key;
pub mod clock;
pub mod constants;
pub mod entities;
pub mod error;
pub mod event;
pub mod fanout;
pub mod identity;
pub mod outbox;

pub use cache_key::{CacheKey, EntityKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use constants::*;
pub use entities::{NewUser, User, UserChangePayload, UserPatch, UserView};
pub use error::{
    CacheError, ConfigError, FanoutError, StorageError, StratusError, StratusResult,
    ValidationError,
};
pub use event::{DomainChangeEvent, EntityRef};
pub use fanout::{
    IntegrationEvent, MessagePublisher, Notification, RealtimeNotifier, SearchIndexer,
    UserDocument,
};
pub use identity::{OutboxId, TenantId, TenantScope, Timestamp, UserId};
pub use outbox::{AggregateMutation, ChangeKind, OutboxRecord, OutboxUpdate, UserDeletedPayload};
