//! Property-Based Tests for tenant isolation
//!
//! **Property: A tenant never observes another tenant's users**
//!
//! For any user created under tenant A and any distinct tenant B, a read
//! through the API under B is a 404 (even once A's view is cached), and
//! updates or deletes under B fail without writing an outbox record.

use axum::http::StatusCode;
use proptest::prelude::*;
use stratus_core::{TenantScope, UserPatch};
use stratus_test_utils::generators::{arb_new_user, arb_tenant_id};
use tokio::runtime::Runtime;

#[path = "support/app.rs"]
mod app;
use app::{json_request, TestApp};

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_foreign_tenant_cannot_read_or_write(
        owner in arb_tenant_id(),
        intruder in arb_tenant_id(),
        input in arb_new_user(),
    ) {
        prop_assume!(owner != intruder);

        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::new();
            let user = app
                .state
                .recorder
                .create_user(TenantScope::new(owner), input)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let uri = format!("/api/v1/users/{}", user.id);

            let response = app.send(json_request("GET", &uri, Some(owner), None)).await;
            prop_assert_eq!(response.status(), StatusCode::OK);

            let response = app.send(json_request("GET", &uri, Some(intruder), None)).await;
            prop_assert_eq!(response.status(), StatusCode::NOT_FOUND);

            let patch = UserPatch {
                first_name: Some("Mallory".to_string()),
                ..Default::default()
            };
            let update = app
                .state
                .recorder
                .update_user(TenantScope::new(intruder), user.id, patch)
                .await;
            prop_assert!(update.is_err());

            let delete = app
                .state
                .recorder
                .delete_user(TenantScope::new(intruder), user.id)
                .await;
            prop_assert!(delete.is_err());

            prop_assert_eq!(app.store.outbox_all().await.len(), 1);
            prop_assert_eq!(app.store.user_count().await, 1);
            Ok(())
        })?;
    }

    #[test]
    fn prop_cache_keys_never_collide_across_tenants(
        a in arb_tenant_id(),
        b in arb_tenant_id(),
        input in arb_new_user(),
    ) {
        prop_assume!(a != b);
        let user = input.into_user(a, stratus_test_utils::fixtures::fixed_start());
        let key_a = stratus_api::user_cache_key(a, user.id);
        let key_b = stratus_api::user_cache_key(b, user.id);
        prop_assert_ne!(key_a.to_string(), key_b.to_string());
    }
}
