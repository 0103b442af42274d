//! User REST API Routes
//!
//! Writes go through the [`ChangeRecorder`]; reads go through the tiered
//! cache with a loader that reads the primary store under the caller's
//! tenant scope.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stratus_cache::TieredCache;
use stratus_core::{Clock, NewUser, UserId, UserPatch, UserView, USER_CACHE_TTL_SECS};
use stratus_storage::ChangeStore;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::TenantContext;
use crate::recorder::{user_cache_key, ChangeRecorder};

// ============================================================================
// TYPES
// ============================================================================

/// Response for a created user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedUser {
    pub id: UserId,
}

// ============================================================================
// SHARED STATE
// ============================================================================

#[derive(Clone)]
pub struct UserState {
    pub store: Arc<dyn ChangeStore>,
    pub cache: Arc<TieredCache>,
    pub recorder: Arc<ChangeRecorder>,
    pub clock: Arc<dyn Clock>,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/users
pub async fn create_user(
    State(state): State<Arc<UserState>>,
    tenant: TenantContext,
    Json(input): Json<NewUser>,
) -> ApiResult<impl IntoResponse> {
    let user = state.recorder.create_user(tenant.scope(), input).await?;
    Ok((StatusCode::CREATED, Json(CreatedUser { id: user.id })))
}

/// GET /api/v1/users/{id}
pub async fn get_user(
    State(state): State<Arc<UserState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserView>> {
    let id = UserId::from(id);
    let scope = tenant.scope();
    let today = state.clock.now().date_naive();
    let store = Arc::clone(&state.store);

    let view = state
        .cache
        .get_or_create(
            &user_cache_key(tenant.tenant_id, id),
            move || async move {
                store
                    .user_get(scope, id)
                    .await
                    .map(|user| user.map(|u| u.view_on(today)))
            },
            Some(Duration::from_secs(USER_CACHE_TTL_SECS)),
        )
        .await?;

    view.map(Json)
        .ok_or_else(|| ApiError::entity_not_found("User", id))
}

/// PUT /api/v1/users/{id}
pub async fn update_user(
    State(state): State<Arc<UserState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<UserPatch>,
) -> ApiResult<Json<UserView>> {
    let user = state
        .recorder
        .update_user(tenant.scope(), UserId::from(id), patch)
        .await?;
    Ok(Json(user.view_on(state.clock.now().date_naive())))
}

/// DELETE /api/v1/users/{id}
pub async fn delete_user(
    State(state): State<Arc<UserState>>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .recorder
        .delete_user(tenant.scope(), UserId::from(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(state: Arc<UserState>) -> Router {
    Router::new()
        .route("/", post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_user_serialization() {
        let id = UserId::now_v7();
        let json = serde_json::to_value(CreatedUser { id }).expect("serialization should succeed");
        assert_eq!(json["id"], id.to_string());
    }
}
