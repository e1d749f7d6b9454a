//! Document paths used by the store layout.
//!
//! Messages live at `messages/{chatId}/chats/{messageId}` and the presence
//! document of a conversation at `status/{chatId}`.

use std::fmt;

use crate::error::ReplicaError;

/// Root collection holding one sub-collection of chats per conversation.
pub const MESSAGES_COLLECTION: &str = "messages";
/// Sub-collection name under each conversation.
pub const CHATS_COLLECTION: &str = "chats";
/// Collection of per-conversation status documents.
pub const STATUS_COLLECTION: &str = "status";

/// Path parameters of a message document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePath {
    pub chat_id: String,
    pub message_id: String,
}

impl MessagePath {
    pub fn new(chat_id: &str, message_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
        }
    }

    /// Parse `messages/{chatId}/chats/{messageId}`.
    pub fn parse(path: &str) -> Result<Self, ReplicaError> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            [MESSAGES_COLLECTION, chat_id, CHATS_COLLECTION, message_id]
                if !chat_id.is_empty() && !message_id.is_empty() =>
            {
                Ok(Self::new(chat_id, message_id))
            }
            _ => Err(ReplicaError::Store(format!(
                "not a message document path: {path}"
            ))),
        }
    }
}

impl fmt::Display for MessagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{MESSAGES_COLLECTION}/{}/{CHATS_COLLECTION}/{}",
            self.chat_id, self.message_id
        )
    }
}

/// Path of the chats collection of a conversation.
pub fn chats_collection(chat_id: &str) -> String {
    format!("{MESSAGES_COLLECTION}/{chat_id}/{CHATS_COLLECTION}")
}

/// Path of the status document of a conversation.
pub fn status_document(chat_id: &str) -> String {
    format!("{STATUS_COLLECTION}/{chat_id}")
}
