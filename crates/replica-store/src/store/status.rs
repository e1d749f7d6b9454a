//! Per-conversation status documents (overwrite semantics).

use super::{format_ts, parse_ts, Store};
use chrono::Utc;
use replica_core::{
    error::ReplicaError,
    message::{ConversationStatus, StatusKind},
};

impl Store {
    /// Overwrite the status document of a conversation.
    pub async fn set_status(&self, chat_id: &str, status: StatusKind) -> Result<(), ReplicaError> {
        sqlx::query(
            "INSERT INTO status (conversation_id, status, last_active) VALUES (?, ?, ?) \
             ON CONFLICT(conversation_id) DO UPDATE SET \
             status = excluded.status, last_active = excluded.last_active",
        )
        .bind(chat_id)
        .bind(status.as_str())
        .bind(format_ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| ReplicaError::Store(format!("status write failed: {e}")))?;
        Ok(())
    }

    /// Read the status document of a conversation.
    pub async fn get_status(
        &self,
        chat_id: &str,
    ) -> Result<Option<ConversationStatus>, ReplicaError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT status, last_active FROM status WHERE conversation_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReplicaError::Store(format!("status read failed: {e}")))?;

        row.map(|(status, last_active)| -> Result<ConversationStatus, ReplicaError> {
            Ok(ConversationStatus {
                status: status.parse()?,
                last_active: parse_ts(&last_active)?,
            })
        })
        .transpose()
    }
}
