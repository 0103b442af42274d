//! Stratus Storage - Store Trait and In-Memory Implementation
//!
//! Defines the transactional store abstraction used by the change recorder,
//! the read path and the outbox relay. The PostgreSQL implementation lives in
//! stratus-api.

pub mod memory;
pub mod store;

pub use memory::InMemoryStore;
pub use store::{ChangeStore, StorageResult};
