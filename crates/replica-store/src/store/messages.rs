//! Chat collections: append, windowed history reads, and the change feed.

use super::{format_ts, parse_ts, Store};
use chrono::Utc;
use replica_core::{
    error::ReplicaError,
    message::{ConversationMessage, Sender},
    path::MessagePath,
};
use uuid::Uuid;

/// A stored chat document together with its insertion sequence number.
#[derive(Debug, Clone)]
pub struct ChatRow {
    pub seq: i64,
    /// `messages/{chatId}/chats/{messageId}`.
    pub path: String,
    pub message: ConversationMessage,
}

type RawRow = (i64, String, String, String, String, String);

fn to_row(raw: RawRow) -> Result<ChatRow, ReplicaError> {
    let (seq, id, conversation_id, text, sender, timestamp) = raw;
    Ok(ChatRow {
        seq,
        path: MessagePath::new(&conversation_id, &id).to_string(),
        message: ConversationMessage {
            id,
            text,
            sender: Sender::from(sender),
            timestamp: parse_ts(&timestamp)?,
        },
    })
}

impl Store {
    /// Append a message to a conversation's chats collection.
    ///
    /// The store assigns the document id and a timestamp that never sorts
    /// before the newest message already in the conversation.
    pub async fn append_message(
        &self,
        chat_id: &str,
        text: &str,
        sender: &Sender,
    ) -> Result<ConversationMessage, ReplicaError> {
        let id = Uuid::new_v4().to_string();
        let now = format_ts(Utc::now());

        let (timestamp,): (String,) = sqlx::query_as(
            "INSERT INTO chats (id, conversation_id, text, sender, timestamp) \
             SELECT ?, ?, ?, ?, MAX(?, COALESCE( \
                 (SELECT MAX(timestamp) FROM chats WHERE conversation_id = ?), '')) \
             RETURNING timestamp",
        )
        .bind(&id)
        .bind(chat_id)
        .bind(text)
        .bind(sender.as_str())
        .bind(&now)
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ReplicaError::Store(format!("insert failed: {e}")))?;

        Ok(ConversationMessage {
            id,
            text: text.to_string(),
            sender: sender.clone(),
            timestamp: parse_ts(&timestamp)?,
        })
    }

    /// The newest `limit` messages of a conversation, oldest first.
    pub async fn recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, ReplicaError> {
        let rows: Vec<RawRow> = sqlx::query_as(
            "SELECT seq, id, conversation_id, text, sender, timestamp FROM chats \
             WHERE conversation_id = ? ORDER BY timestamp DESC, seq DESC LIMIT ?",
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReplicaError::Store(format!("query failed: {e}")))?;

        // Rows come newest-first, reverse for chronological order.
        rows.into_iter()
            .rev()
            .map(|r| to_row(r).map(|row| row.message))
            .collect()
    }

    /// Chat documents inserted after `after_seq`, in insertion order.
    pub async fn changes_since(
        &self,
        after_seq: i64,
        limit: i64,
    ) -> Result<Vec<ChatRow>, ReplicaError> {
        let rows: Vec<RawRow> = sqlx::query_as(
            "SELECT seq, id, conversation_id, text, sender, timestamp FROM chats \
             WHERE seq > ? ORDER BY seq ASC LIMIT ?",
        )
        .bind(after_seq)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReplicaError::Store(format!("change feed query failed: {e}")))?;

        rows.into_iter().map(to_row).collect()
    }

    /// Highest insertion sequence number so far (0 when empty).
    pub async fn max_seq(&self) -> Result<i64, ReplicaError> {
        let (max,): (Option<i64>,) = sqlx::query_as("SELECT MAX(seq) FROM chats")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ReplicaError::Store(format!("query failed: {e}")))?;
        Ok(max.unwrap_or(0))
    }

    /// Number of messages stored for a conversation.
    pub async fn message_count(&self, chat_id: &str) -> Result<i64, ReplicaError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chats WHERE conversation_id = ?")
                .bind(chat_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| ReplicaError::Store(format!("query failed: {e}")))?;
        Ok(count)
    }
}
