//! Request Context Middleware
//!
//! - [`TenantContext`]: extractor resolving the calling tenant from the
//!   `X-Tenant-Id` header. Stands in for claim extraction done upstream by the
//!   authenticating proxy. Missing or malformed headers yield 401.
//! - [`correlation_id`]: echoes `X-Correlation-Id`, generating one when absent,
//!   and attaches it to the request span.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderValue},
    middleware::Next,
    response::Response,
};
use stratus_core::{TenantId, TenantScope};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::constants::{CORRELATION_HEADER, TENANT_HEADER};
use crate::error::ApiError;

// ============================================================================
// TENANT CONTEXT
// ============================================================================

/// The tenant a request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: TenantId,
}

impl TenantContext {
    /// Read predicate for tenant-owned data.
    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.tenant_id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(TENANT_HEADER)
            .ok_or_else(|| ApiError::missing_tenant("Missing X-Tenant-Id header"))?;

        let tenant_id = raw
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<TenantId>().ok())
            .ok_or_else(|| ApiError::missing_tenant("X-Tenant-Id is not a valid tenant id"))?;

        Ok(Self { tenant_id })
    }
}

// ============================================================================
// CORRELATION ID
// ============================================================================

/// Correlation id of the current request, available as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

/// Propagate or mint a correlation id.
pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    request.extensions_mut().insert(CorrelationId(id.clone()));

    let span = info_span!("request", correlation_id = %id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
