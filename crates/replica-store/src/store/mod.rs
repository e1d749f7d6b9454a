//! SQLite-backed document store.
//!
//! Split into focused submodules:
//! - `messages`: the `messages/{chatId}/chats` collections (append, windowed reads, change feed)
//! - `status`: the `status/{chatId}` documents (overwrite, read)

mod messages;
mod status;

pub use messages::ChatRow;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use replica_core::{
    config::StoreConfig,
    error::ReplicaError,
    message::{ConversationMessage, ConversationStatus, Sender, StatusKind},
    shellexpand,
    traits::DocumentStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Persistent document store backed by SQLite.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

/// `store.db_path` value selecting a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

impl Store {
    /// Open (or create) the database file and run migrations.
    ///
    /// `db_path = ":memory:"` opens a throwaway database that lives as long
    /// as the store.
    pub async fn new(config: &StoreConfig) -> Result<Self, ReplicaError> {
        if config.db_path == IN_MEMORY_PATH {
            let store = Self::open_in_memory().await?;
            info!("Document store initialized in memory");
            return Ok(store);
        }

        let db_path = shellexpand(&config.db_path);

        // Ensure parent directory exists.
        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ReplicaError::Store(format!("failed to create data dir: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| ReplicaError::Store(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| ReplicaError::Store(format!("failed to connect to sqlite: {e}")))?;

        Self::run_migrations(&pool).await?;

        info!("Document store initialized at {db_path}");

        Ok(Self { pool })
    }

    /// Throwaway in-memory store with the full schema.
    pub async fn open_in_memory() -> Result<Self, ReplicaError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| ReplicaError::Store(format!("invalid db url: {e}")))?
            .create_if_missing(true);
        // Each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| ReplicaError::Store(format!("failed to open in-memory sqlite: {e}")))?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the database file size in bytes.
    pub async fn db_size(&self) -> Result<u64, ReplicaError> {
        let (page_count,): (i64,) = sqlx::query_as("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ReplicaError::Store(format!("pragma failed: {e}")))?;

        let (page_size,): (i64,) = sqlx::query_as("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ReplicaError::Store(format!("pragma failed: {e}")))?;

        Ok((page_count * page_size) as u64)
    }

    /// Run SQL migrations, tracking which have already been applied.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), ReplicaError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| ReplicaError::Store(format!("failed to create migrations table: {e}")))?;

        let migrations: &[(&str, &str)] = &[
            ("001_init", include_str!("../../migrations/001_init.sql")),
            (
                "002_audit_log",
                include_str!("../../migrations/002_audit_log.sql"),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        ReplicaError::Store(format!("failed to check migration {name}: {e}"))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map_err(|e| ReplicaError::Store(format!("migration {name} failed: {e}")))?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| {
                    ReplicaError::Store(format!("failed to record migration {name}: {e}"))
                })?;
        }
        Ok(())
    }
}

/// Fixed-width RFC 3339 so that text comparison matches time order.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, ReplicaError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ReplicaError::Store(format!("bad timestamp '{raw}': {e}")))
}

#[async_trait]
impl DocumentStore for Store {
    async fn recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, ReplicaError> {
        Store::recent_messages(self, chat_id, limit).await
    }

    async fn append_message(
        &self,
        chat_id: &str,
        text: &str,
        sender: &Sender,
    ) -> Result<ConversationMessage, ReplicaError> {
        Store::append_message(self, chat_id, text, sender).await
    }

    async fn set_status(&self, chat_id: &str, status: StatusKind) -> Result<(), ReplicaError> {
        Store::set_status(self, chat_id, status).await
    }

    async fn get_status(&self, chat_id: &str) -> Result<Option<ConversationStatus>, ReplicaError> {
        Store::get_status(self, chat_id).await
    }
}
