//! API Error Type
//!
//! Every handler returns [`ApiResult`]. Failures render as a JSON body
//! `{ "code": "...", "message": "...", "details": ... }` with the status
//! that [`ErrorCode::status_code`] assigns. Store and cache internals are
//! logged here and replaced by generic messages before they reach a client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use stratus_core::{
    CacheError, ConfigError, FanoutError, StorageError, StratusError, ValidationError,
};

// ============================================================================
// ERROR CODES
// ============================================================================

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No usable `X-Tenant-Id` on a tenant-scoped route
    MissingTenant,

    /// Body parsed but failed domain validation
    ValidationFailed,

    /// Request could not be interpreted at all
    MalformedRequest,

    EntityNotFound,

    /// Write collided with an existing row
    Conflict,

    /// Primary store unreachable
    StoreUnavailable,

    /// Primary store reachable but the operation failed
    StoreFailure,

    CacheFailure,

    /// A fanout target refused or could not be reached
    DeliveryFailed,

    Internal,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::MissingTenant => StatusCode::UNAUTHORIZED,
            ErrorCode::ValidationFailed | ErrorCode::MalformedRequest => StatusCode::BAD_REQUEST,
            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DeliveryFailed => StatusCode::BAD_GATEWAY,
            ErrorCode::StoreFailure | ErrorCode::CacheFailure | ErrorCode::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Structured context, e.g. the offending field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn missing_tenant(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingTenant, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedRequest, message)
    }

    pub fn entity_not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::EntityNotFound, format!("{} {} does not exist", entity, id))
    }

    pub fn conflict(entity: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Conflict, format!("{} {} is already present", entity, id))
    }

    pub fn store_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreFailure, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

// ============================================================================
// DOMAIN CONVERSIONS
// ============================================================================

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => ApiError::entity_not_found(kind.as_str(), id),
            StorageError::AlreadyExists { kind, id } => ApiError::conflict(kind.as_str(), id),
            StorageError::Connection { reason } => {
                tracing::error!(%reason, "Primary store unreachable");
                ApiError::new(ErrorCode::StoreUnavailable, "Primary store unavailable")
            }
            other => {
                tracing::error!(error = %other, "Primary store operation failed");
                ApiError::store_failure("Store operation failed")
            }
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        tracing::error!(error = %err, "Cache operation failed");
        ApiError::new(ErrorCode::CacheFailure, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::RequiredFieldMissing { field }
            | ValidationError::InvalidValue { field, .. } => field.clone(),
        };
        ApiError::validation_failed(err.to_string())
            .with_details(serde_json::json!({ "field": field }))
    }
}

impl From<FanoutError> for ApiError {
    fn from(err: FanoutError) -> Self {
        ApiError::new(ErrorCode::DeliveryFailed, err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(format!("Invalid configuration: {}", err))
    }
}

impl From<StratusError> for ApiError {
    fn from(err: StratusError) -> Self {
        match err {
            StratusError::Storage(e) => e.into(),
            StratusError::Cache(e) => e.into(),
            StratusError::Fanout(e) => e.into(),
            StratusError::Validation(e) => e.into(),
            StratusError::Config(e) => e.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
