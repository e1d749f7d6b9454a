use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ReplicaError;
use crate::path::MessagePath;

/// Who wrote a conversation message.
///
/// Stored as a plain string: `"user"` for the external user, anything else
/// is a named author (the persona writes under its own identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Sender {
    /// The human on the other side of the conversation.
    User,
    /// A named author, e.g. the persona.
    Named(String),
}

impl Sender {
    /// Reserved sender value for the external user.
    pub const USER: &'static str = "user";

    pub fn as_str(&self) -> &str {
        match self {
            Self::User => Self::USER,
            Self::Named(name) => name,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }

    /// Whether this sender is the given identity.
    pub fn is(&self, identity: &str) -> bool {
        self.as_str() == identity
    }
}

impl From<String> for Sender {
    fn from(value: String) -> Self {
        if value == Self::USER {
            Self::User
        } else {
            Self::Named(value)
        }
    }
}

impl From<&str> for Sender {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Sender> for String {
    fn from(value: Sender) -> Self {
        match value {
            Sender::User => Sender::USER.to_string(),
            Sender::Named(name) => name,
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message document in `messages/{chatId}/chats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Store-assigned document id.
    pub id: String,
    pub text: String,
    pub sender: Sender,
    /// Store-assigned; defines conversation order.
    pub timestamp: DateTime<Utc>,
}

/// Presence shown to whoever watches the status document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Typing,
    Online,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Typing => "typing",
            Self::Online => "online",
        }
    }
}

impl FromStr for StatusKind {
    type Err = ReplicaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "typing" => Ok(Self::Typing),
            "online" => Ok(Self::Online),
            other => Err(ReplicaError::Store(format!("unknown status '{other}'"))),
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single `status/{chatId}` document of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStatus {
    pub status: StatusKind,
    pub last_active: DateTime<Utc>,
}

/// Creation event for a new document under `messages/{chatId}/chats/{messageId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCreated {
    pub chat_id: String,
    pub message_id: String,
    pub message: ConversationMessage,
}

impl MessageCreated {
    /// Build an event from the created document's path and data.
    pub fn from_path(path: &str, message: ConversationMessage) -> Result<Self, ReplicaError> {
        let parsed = MessagePath::parse(path)?;
        Ok(Self {
            chat_id: parsed.chat_id,
            message_id: parsed.message_id,
            message,
        })
    }
}

/// Text produced by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelReply {
    pub text: String,
    pub metadata: ReplyMetadata,
}

/// Metadata about how a reply was generated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyMetadata {
    /// Which provider produced this reply.
    pub provider_used: String,
    /// Token count (if available from the provider).
    pub tokens_used: Option<u64>,
    /// Wall-clock generation time in milliseconds.
    pub processing_time_ms: u64,
    /// Model identifier (if applicable).
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_user_round_trip() {
        let sender = Sender::from("user");
        assert!(sender.is_user());
        assert_eq!(serde_json::to_string(&sender).unwrap(), "\"user\"");
        let back: Sender = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(back, Sender::User);
    }

    #[test]
    fn test_sender_named() {
        let sender = Sender::from("rohan");
        assert!(!sender.is_user());
        assert!(sender.is("rohan"));
        assert!(!sender.is("user"));
        assert_eq!(sender.to_string(), "rohan");
    }

    #[test]
    fn test_status_kind_serde_lowercase() {
        let json = serde_json::to_string(&StatusKind::Typing).unwrap();
        assert_eq!(json, "\"typing\"");
        assert_eq!("online".parse::<StatusKind>().unwrap(), StatusKind::Online);
        assert!("away".parse::<StatusKind>().is_err());
    }

    #[test]
    fn test_message_created_from_path() {
        let msg = ConversationMessage {
            id: "m1".into(),
            text: "hey".into(),
            sender: Sender::User,
            timestamp: Utc::now(),
        };
        let event = MessageCreated::from_path("messages/chat-42/chats/m1", msg).unwrap();
        assert_eq!(event.chat_id, "chat-42");
        assert_eq!(event.message_id, "m1");
        assert!(MessageCreated::from_path("status/chat-42", event.message).is_err());
    }
}
