//! Audit log: one row per responder invocation that passed the self-trigger guard.

use replica_core::error::ReplicaError;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// An entry to write to the audit log.
pub struct AuditEntry {
    pub chat_id: String,
    pub message_id: String,
    pub input_text: String,
    pub output_text: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tokens_used: Option<i64>,
    /// Time spent inside the provider call.
    pub generation_ms: Option<i64>,
    /// Whole invocation, artificial delay included.
    pub processing_ms: Option<i64>,
    pub status: AuditStatus,
    pub error: Option<String>,
}

/// Summary of the newest audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub chat_id: String,
    pub status: AuditStatus,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tokens_used: Option<i64>,
    pub generation_ms: Option<i64>,
    pub processing_ms: Option<i64>,
    pub error: Option<String>,
}

/// Outcome of an audited invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Ok,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }

    fn parse(s: &str) -> Result<Self, ReplicaError> {
        match s {
            "ok" => Ok(Self::Ok),
            "error" => Ok(Self::Error),
            other => Err(ReplicaError::Store(format!("unknown audit status: {other}"))),
        }
    }
}

type AuditRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<String>,
);

/// Audit logger backed by SQLite.
#[derive(Clone)]
pub struct AuditLogger {
    pool: SqlitePool,
}

impl AuditLogger {
    /// Create a new audit logger sharing the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write an entry to the audit log.
    pub async fn log(&self, entry: &AuditEntry) -> Result<(), ReplicaError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO audit_log \
             (id, conversation_id, message_id, input_text, output_text, \
              provider, model, tokens_used, generation_ms, processing_ms, status, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&entry.chat_id)
        .bind(&entry.message_id)
        .bind(&entry.input_text)
        .bind(&entry.output_text)
        .bind(&entry.provider)
        .bind(&entry.model)
        .bind(entry.tokens_used)
        .bind(entry.generation_ms)
        .bind(entry.processing_ms)
        .bind(entry.status.as_str())
        .bind(&entry.error)
        .execute(&self.pool)
        .await
        .map_err(|e| ReplicaError::Store(format!("audit log write failed: {e}")))?;

        debug!(
            "audit: {} [{}] {}",
            entry.chat_id,
            entry.status.as_str(),
            truncate(&entry.input_text, 80)
        );

        Ok(())
    }

    /// The most recently written entry, if any.
    pub async fn latest(&self) -> Result<Option<AuditRecord>, ReplicaError> {
        let row: Option<AuditRow> = sqlx::query_as(
            "SELECT conversation_id, status, provider, model, tokens_used, \
             generation_ms, processing_ms, error \
             FROM audit_log ORDER BY timestamp DESC, rowid DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReplicaError::Store(format!("audit read failed: {e}")))?;

        row.map(
            |(chat_id, status, provider, model, tokens_used, generation_ms, processing_ms, error)| {
                Ok(AuditRecord {
                    chat_id,
                    status: AuditStatus::parse(&status)?,
                    provider,
                    model,
                    tokens_used,
                    generation_ms,
                    processing_ms,
                    error,
                })
            },
        )
        .transpose()
    }

    /// Invocation counts as `(ok, error)`.
    pub async fn counts(&self) -> Result<(i64, i64), ReplicaError> {
        let (ok, err): (i64, i64) = sqlx::query_as(
            "SELECT \
             COALESCE(SUM(CASE WHEN status = 'ok' THEN 1 ELSE 0 END), 0), \
             COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0) \
             FROM audit_log",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ReplicaError::Store(format!("audit count failed: {e}")))?;
        Ok((ok, err))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
