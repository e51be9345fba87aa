//! `PostgreSQL` message store for msgflow.
//!
//! Implements [`MessageStore`] over a sqlx connection pool. The pool is
//! shared by every concurrent orchestrator call.
//!
//! # Schema
//!
//! Applied by [`PostgresMessageStore::migrate`] from `./migrations`:
//!
//! ```sql
//! CREATE TABLE messages (
//!     id BIGSERIAL PRIMARY KEY,
//!     content VARCHAR(256) NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     processed_at TIMESTAMPTZ NULL
//! );
//! ```
//!
//! plus partial indexes on `id` for the processed and unprocessed subsets.
//!
//! # Example
//!
//! ```ignore
//! use msgflow_postgres::{PoolSettings, PostgresMessageStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresMessageStore::connect("postgres://localhost/messages", &PoolSettings::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use msgflow_core::store::{MessageStore, StoreError, StoreFuture};
use msgflow_core::{Message, MessageId, MessageUpdate, NewMessage};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Connection pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// How long to wait for a connection before failing
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    content: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let id = u64::try_from(row.id)
            .map_err(|_| StoreError::DatabaseError(format!("Invalid message id: {}", row.id)))?;

        Ok(Self {
            id: MessageId::new(id),
            content: row.content,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

fn db_error(e: &sqlx::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

/// Clamp to the `BIGINT` range used by `LIMIT` / `OFFSET`.
fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_db_id(id: MessageId) -> Result<i64, StoreError> {
    i64::try_from(id.value()).map_err(|_| StoreError::NotFound(id))
}

/// PostgreSQL-backed [`MessageStore`].
///
/// Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    /// Open a connection pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if no connection can be
    /// established within `settings.connect_timeout`.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to connect: {e}")))?;

        tracing::info!(
            max_connections = settings.max_connections,
            min_connections = settings.min_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `messages` table and its indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Migration failed: {e}")))?;

        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Close every pooled connection and wait for them to be released.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }

    async fn list_where(
        &self,
        predicate: &'static str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Message>, StoreError> {
        let sql = format!(
            "SELECT id, content, created_at, processed_at FROM messages \
             {predicate} ORDER BY id LIMIT $1 OFFSET $2"
        );

        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(to_bigint(limit))
            .bind(to_bigint(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;

        rows.into_iter().map(Message::try_from).collect()
    }
}

impl MessageStore for PostgresMessageStore {
    fn list_all(&self, limit: u64, offset: u64) -> StoreFuture<'_, Vec<Message>> {
        Box::pin(self.list_where("", limit, offset))
    }

    fn list_processed(&self, limit: u64, offset: u64) -> StoreFuture<'_, Vec<Message>> {
        Box::pin(self.list_where("WHERE processed_at IS NOT NULL", limit, offset))
    }

    fn list_unprocessed(&self, limit: u64, offset: u64) -> StoreFuture<'_, Vec<Message>> {
        Box::pin(self.list_where("WHERE processed_at IS NULL", limit, offset))
    }

    fn insert(&self, message: NewMessage) -> StoreFuture<'_, MessageId> {
        Box::pin(async move {
            let (id,): (i64,) =
                sqlx::query_as("INSERT INTO messages (content) VALUES ($1) RETURNING id")
                    .bind(message.content.as_str())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| db_error(&e))?;

            let id = u64::try_from(id)
                .map_err(|_| StoreError::DatabaseError(format!("Invalid message id: {id}")))?;

            tracing::debug!(message_id = id, "Message inserted");
            Ok(MessageId::new(id))
        })
    }

    fn update_by_id(&self, update: MessageUpdate) -> StoreFuture<'_, Message> {
        Box::pin(async move {
            let id = to_db_id(update.id)?;

            let row: Option<MessageRow> = sqlx::query_as(
                r"
                UPDATE messages
                SET processed_at = COALESCE($2, processed_at)
                WHERE id = $1
                RETURNING id, content, created_at, processed_at
                ",
            )
            .bind(id)
            .bind(update.processed_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;

            let row = row.ok_or(StoreError::NotFound(update.id))?;
            Message::try_from(row)
        })
    }
}
