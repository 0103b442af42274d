//! Error types for Stratus operations

use crate::EntityKind;
use thiserror::Error;
use uuid::Uuid;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {kind} with id {id}")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("Entity already exists: {kind} with id {id}")]
    AlreadyExists { kind: EntityKind, id: Uuid },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Query failed: {reason}")]
    Query { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Cache deserialization failed: {reason}")]
    Deserialization { reason: String },

    #[error("Cache tier {tier} failed: {reason}")]
    Backend { tier: &'static str, reason: String },
}

/// Errors raised by downstream fanout targets.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FanoutError {
    #[error("{target} rejected the request with status {status}: {reason}")]
    Rejected {
        target: &'static str,
        status: u16,
        reason: String,
    },

    #[error("{target} is unreachable: {reason}")]
    Transport { target: &'static str, reason: String },

    #[error("Undeliverable payload: {reason}")]
    Payload { reason: String },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Stratus errors.
#[derive(Debug, Clone, Error)]
pub enum StratusError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Fanout error: {0}")]
    Fanout(#[from] FanoutError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Stratus operations.
pub type StratusResult<T> = Result<T, StratusError>;

// =============================================================================
// TESTS
// =============================================================================
