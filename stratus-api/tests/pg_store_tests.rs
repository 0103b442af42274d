//! PostgreSQL store tests. Require a reachable database configured through
//! the `STRATUS_DB_*` variables.

#![cfg(feature = "db-tests")]

use stratus_api::{ApiResult, DbConfig, PgStore};
use stratus_core::{
    AggregateMutation, ChangeKind, OutboxRecord, OutboxUpdate, TenantId, TenantScope,
};
use stratus_storage::ChangeStore;
use stratus_test_utils::fixtures;

async fn test_store() -> ApiResult<PgStore> {
    let store = PgStore::from_config(&DbConfig::from_env())?;
    store.ensure_schema().await?;
    Ok(store)
}

fn created_record(user: &stratus_core::User) -> OutboxRecord {
    fixtures::pending_record(user, ChangeKind::UserCreated, fixtures::fixed_start())
}

#[tokio::test]
async fn test_commit_persists_row_and_record() -> ApiResult<()> {
    let store = test_store().await?;
    let tenant = TenantId::now_v7();
    let user = fixtures::user_in(tenant, "Pg");
    let record = created_record(&user);

    store
        .commit_change(&AggregateMutation::InsertUser(user.clone()), &record)
        .await?;

    let loaded = store.user_get(TenantScope::new(tenant), user.id).await?;
    assert_eq!(loaded, Some(user.clone()));

    let other = store
        .user_get(TenantScope::new(TenantId::now_v7()), user.id)
        .await?;
    assert_eq!(other, None);

    let stored = store.outbox_get(record.id).await?.expect("record should exist");
    assert!(stored.is_pending());
    assert_eq!(stored.message_type, "UserCreated");
    Ok(())
}

#[tokio::test]
async fn test_failed_outbox_insert_rolls_back_row() -> ApiResult<()> {
    let store = test_store().await?;
    let tenant = TenantId::now_v7();
    let first = fixtures::user_in(tenant, "First");
    let record = created_record(&first);
    store
        .commit_change(&AggregateMutation::InsertUser(first), &record)
        .await?;

    // Reusing the outbox id violates its primary key after the row insert.
    let second = fixtures::user_in(tenant, "Second");
    let result = store
        .commit_change(&AggregateMutation::InsertUser(second.clone()), &record)
        .await;
    assert!(result.is_err());

    let loaded = store.user_get(TenantScope::new(tenant), second.id).await?;
    assert_eq!(loaded, None);
    Ok(())
}

#[tokio::test]
async fn test_apply_marks_processed_and_keeps_error() -> ApiResult<()> {
    let store = test_store().await?;
    let user = fixtures::user_in(TenantId::now_v7(), "Relay");
    let record = created_record(&user);
    store
        .commit_change(&AggregateMutation::InsertUser(user), &record)
        .await?;

    store
        .outbox_apply(&[OutboxUpdate::Failed {
            id: record.id,
            error: "search index unavailable".to_string(),
        }])
        .await?;
    let failed = store.outbox_get(record.id).await?.expect("record should exist");
    assert!(failed.is_pending());
    assert_eq!(failed.error.as_deref(), Some("search index unavailable"));

    let at = fixtures::fixed_start();
    store
        .outbox_apply(&[OutboxUpdate::Processed { id: record.id, at }])
        .await?;
    let processed = store.outbox_get(record.id).await?.expect("record should exist");
    assert_eq!(processed.processed_at, Some(at));
    assert_eq!(processed.error.as_deref(), Some("search index unavailable"));
    Ok(())
}
