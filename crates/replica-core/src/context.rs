use serde::{Deserialize, Serialize};

use crate::message::ConversationMessage;

/// Role of a turn as seen by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// A single entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: Role,
    pub content: String,
}

impl ContextEntry {
    /// Only the external user's messages are `user` turns; everything else,
    /// the persona's earlier replies included, is a `model` turn.
    pub fn from_message(message: &ConversationMessage) -> Self {
        let role = if message.sender.is_user() {
            Role::User
        } else {
            Role::Model
        };
        Self {
            role,
            content: message.text.clone(),
        }
    }
}

/// Conversation context passed to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Steering instruction prepended to every request.
    pub system_instruction: String,
    /// Conversation history (oldest first).
    pub history: Vec<ContextEntry>,
    /// The new user message.
    pub current_message: String,
}

/// A structured message for API-based providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: Role,
    pub content: String,
}

impl Context {
    /// Create a context with no history.
    pub fn new(system_instruction: &str, message: &str) -> Self {
        Self {
            system_instruction: system_instruction.to_string(),
            history: Vec::new(),
            current_message: message.to_string(),
        }
    }

    /// Build a context from a history window that is already in
    /// chronological order.
    pub fn from_window(
        system_instruction: &str,
        window: &[ConversationMessage],
        current_message: &str,
    ) -> Self {
        Self {
            system_instruction: system_instruction.to_string(),
            history: window.iter().map(ContextEntry::from_message).collect(),
            current_message: current_message.to_string(),
        }
    }

    /// Convert context to structured API messages.
    ///
    /// Returns `(system_instruction, messages)`; the instruction is kept apart
    /// because Gemini takes it outside the contents array.
    pub fn to_api_messages(&self) -> (String, Vec<ApiMessage>) {
        let mut messages = Vec::with_capacity(self.history.len() + 1);

        for entry in &self.history {
            messages.push(ApiMessage {
                role: entry.role,
                content: entry.content.clone(),
            });
        }

        messages.push(ApiMessage {
            role: Role::User,
            content: self.current_message.clone(),
        });

        (self.system_instruction.clone(), messages)
    }
}
