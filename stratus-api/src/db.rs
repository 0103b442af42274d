//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and [`PgStore`], the
//! production [`ChangeStore`]. A change and its outbox record are written in
//! one `tokio_postgres` transaction; dropping an uncommitted transaction rolls
//! it back.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::time::Duration;
use stratus_core::{
    AggregateMutation, EntityKind, OutboxId, OutboxRecord, OutboxUpdate, StorageError,
    TenantScope, User, UserId,
};
use stratus_storage::{ChangeStore, StorageResult};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::constants::{DEFAULT_DB_POOL_SIZE, DEFAULT_DB_TIMEOUT_SECS};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long to wait for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "stratus".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: DEFAULT_DB_POOL_SIZE,
            timeout: Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("STRATUS_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("STRATUS_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("STRATUS_DB_NAME").unwrap_or_else(|_| "stratus".to_string()),
            user: std::env::var("STRATUS_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("STRATUS_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("STRATUS_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_POOL_SIZE),
            timeout: Duration::from_secs(
                std::env::var("STRATUS_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DB_TIMEOUT_SECS),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::store_failure(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Tables for users and the outbox. Idempotent.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            UUID PRIMARY KEY,
    tenant_id     UUID NOT NULL,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    email         TEXT NOT NULL,
    date_of_birth DATE NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS users_tenant_idx ON users (tenant_id);

CREATE TABLE IF NOT EXISTS outbox_messages (
    id           UUID PRIMARY KEY,
    occurred_at  TIMESTAMPTZ NOT NULL,
    message_type TEXT NOT NULL,
    payload      JSONB NOT NULL,
    processed_at TIMESTAMPTZ NULL,
    error        TEXT NULL
);

CREATE INDEX IF NOT EXISTS outbox_messages_pending_idx
    ON outbox_messages (occurred_at, id)
    WHERE processed_at IS NULL;
"#;

const USER_COLUMNS: &str =
    "id, tenant_id, first_name, last_name, email, date_of_birth, created_at, updated_at";

const OUTBOX_COLUMNS: &str = "id, occurred_at, message_type, payload, processed_at, error";

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(e: deadpool_postgres::PoolError) -> StorageError {
    StorageError::Connection {
        reason: e.to_string(),
    }
}

fn query_error(e: tokio_postgres::Error) -> StorageError {
    StorageError::Query {
        reason: e.to_string(),
    }
}

fn user_not_found(id: UserId) -> StorageError {
    StorageError::NotFound {
        kind: EntityKind::User,
        id: id.as_uuid(),
    }
}

fn user_from_row(row: &Row) -> Result<User, tokio_postgres::Error> {
    Ok(User {
        id: UserId::new(row.try_get(0)?),
        tenant_id: row.try_get::<_, Uuid>(1)?.into(),
        first_name: row.try_get(2)?,
        last_name: row.try_get(3)?,
        email: row.try_get(4)?,
        date_of_birth: row.try_get(5)?,
        created_at: row.try_get(6)?,
        updated_at: row.try_get(7)?,
    })
}

fn outbox_from_row(row: &Row) -> Result<OutboxRecord, tokio_postgres::Error> {
    Ok(OutboxRecord {
        id: OutboxId::new(row.try_get(0)?),
        occurred_at: row.try_get(1)?,
        message_type: row.try_get(2)?,
        payload: row.try_get(3)?,
        processed_at: row.try_get(4)?,
        error: row.try_get(5)?,
    })
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

/// [`ChangeStore`] backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size, for health reporting.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> StorageResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Create tables and indexes if missing.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(query_error)
    }

    /// Simple connectivity check.
    pub async fn health_check(&self) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(query_error)?;
        Ok(())
    }
}

async fn apply_mutation(
    tx: &deadpool_postgres::Transaction<'_>,
    mutation: &AggregateMutation,
) -> StorageResult<()> {
    match mutation {
        AggregateMutation::InsertUser(user) => {
            let id = user.id.as_uuid();
            let tenant_id = user.tenant_id.as_uuid();
            let sql = format!(
                "INSERT INTO users ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                USER_COLUMNS
            );
            tx.execute(
                sql.as_str(),
                &[
                    &id,
                    &tenant_id,
                    &user.first_name,
                    &user.last_name,
                    &user.email,
                    &user.date_of_birth,
                    &user.created_at,
                    &user.updated_at,
                ],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    StorageError::AlreadyExists {
                        kind: EntityKind::User,
                        id,
                    }
                } else {
                    query_error(e)
                }
            })?;
        }
        AggregateMutation::UpdateUser(user) => {
            let id = user.id.as_uuid();
            let tenant_id = user.tenant_id.as_uuid();
            let updated = tx
                .execute(
                    "UPDATE users SET first_name = $3, last_name = $4, email = $5, \
                     date_of_birth = $6, updated_at = $7 \
                     WHERE id = $1 AND tenant_id = $2",
                    &[
                        &id,
                        &tenant_id,
                        &user.first_name,
                        &user.last_name,
                        &user.email,
                        &user.date_of_birth,
                        &user.updated_at,
                    ],
                )
                .await
                .map_err(query_error)?;
            if updated == 0 {
                return Err(user_not_found(user.id));
            }
        }
        AggregateMutation::DeleteUser { tenant_id, user_id } => {
            let id = user_id.as_uuid();
            let tenant = tenant_id.as_uuid();
            let deleted = tx
                .execute(
                    "DELETE FROM users WHERE id = $1 AND tenant_id = $2",
                    &[&id, &tenant],
                )
                .await
                .map_err(query_error)?;
            if deleted == 0 {
                return Err(user_not_found(*user_id));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ChangeStore for PgStore {
    async fn commit_change(
        &self,
        mutation: &AggregateMutation,
        record: &OutboxRecord,
    ) -> StorageResult<()> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(query_error)?;

        apply_mutation(&tx, mutation).await?;

        let outbox_id = record.id.as_uuid();
        let sql = format!(
            "INSERT INTO outbox_messages ({}) VALUES ($1, $2, $3, $4, $5, $6)",
            OUTBOX_COLUMNS
        );
        tx.execute(
            sql.as_str(),
            &[
                &outbox_id,
                &record.occurred_at,
                &record.message_type,
                &record.payload,
                &record.processed_at,
                &record.error,
            ],
        )
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(|e| StorageError::TransactionFailed {
            reason: e.to_string(),
        })
    }

    async fn user_get(&self, scope: TenantScope, id: UserId) -> StorageResult<Option<User>> {
        let conn = self.get_conn().await?;
        let user_id = id.as_uuid();
        let tenant_id = scope.tenant_id().as_uuid();
        let sql = format!(
            "SELECT {} FROM users WHERE id = $1 AND tenant_id = $2",
            USER_COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&user_id, &tenant_id])
            .await
            .map_err(query_error)?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(query_error)
    }

    async fn outbox_fetch_pending(&self, limit: usize) -> StorageResult<Vec<OutboxRecord>> {
        let conn = self.get_conn().await?;
        let limit = limit as i64;
        let sql = format!(
            "SELECT {} FROM outbox_messages WHERE processed_at IS NULL \
             ORDER BY occurred_at, id LIMIT $1",
            OUTBOX_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[&limit])
            .await
            .map_err(query_error)?;
        rows.iter()
            .map(outbox_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)
    }

    async fn outbox_apply(&self, updates: &[OutboxUpdate]) -> StorageResult<()> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(query_error)?;

        for update in updates {
            let id = update.id().as_uuid();
            let touched = match update {
                OutboxUpdate::Processed { at, .. } => {
                    tx.execute(
                        "UPDATE outbox_messages SET processed_at = $2 WHERE id = $1",
                        &[&id, at],
                    )
                    .await
                }
                OutboxUpdate::Failed { error, .. } => {
                    tx.execute(
                        "UPDATE outbox_messages SET error = $2 WHERE id = $1",
                        &[&id, error],
                    )
                    .await
                }
            }
            .map_err(query_error)?;

            if touched == 0 {
                return Err(StorageError::TransactionFailed {
                    reason: format!("unknown outbox record {}", id),
                });
            }
        }

        tx.commit().await.map_err(|e| StorageError::TransactionFailed {
            reason: e.to_string(),
        })
    }

    async fn outbox_get(&self, id: OutboxId) -> StorageResult<Option<OutboxRecord>> {
        let conn = self.get_conn().await?;
        let outbox_id = id.as_uuid();
        let sql = format!("SELECT {} FROM outbox_messages WHERE id = $1", OUTBOX_COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[&outbox_id])
            .await
            .map_err(query_error)?;
        row.as_ref()
            .map(outbox_from_row)
            .transpose()
            .map_err(query_error)
    }

    async fn outbox_pending_count(&self) -> StorageResult<u64> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM outbox_messages WHERE processed_at IS NULL",
                &[],
            )
            .await
            .map_err(query_error)?;
        let count: i64 = row.try_get(0).map_err(query_error)?;
        Ok(count.max(0) as u64)
    }
}
