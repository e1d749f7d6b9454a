use crate::{
    context::Context,
    error::ReplicaError,
    message::{ConversationMessage, ConversationStatus, MessageCreated, ModelReply, Sender, StatusKind},
};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Generative model backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Generate a reply for the given context.
    ///
    /// Implementations return `ReplicaError::Generation` when the backend fails
    /// or produces no usable text.
    async fn complete(&self, context: &Context) -> Result<ModelReply, ReplicaError>;

    /// Check if the provider is reachable and configured.
    async fn is_available(&self) -> bool;
}

/// Document store holding the chat collections and status documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The newest `limit` messages of a conversation, oldest first.
    async fn recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, ReplicaError>;

    /// Append a new message document; the store assigns id and timestamp.
    async fn append_message(
        &self,
        chat_id: &str,
        text: &str,
        sender: &Sender,
    ) -> Result<ConversationMessage, ReplicaError>;

    /// Overwrite the conversation's status document.
    async fn set_status(&self, chat_id: &str, status: StatusKind) -> Result<(), ReplicaError>;

    /// Read the conversation's status document, if it exists.
    async fn get_status(&self, chat_id: &str) -> Result<Option<ConversationStatus>, ReplicaError>;
}

/// Source of message creation events.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Human-readable source name.
    fn name(&self) -> &str;

    /// Start listening. Returns a receiver yielding one event per new message.
    async fn start(&self) -> Result<mpsc::Receiver<MessageCreated>, ReplicaError>;

    /// Stop producing events.
    async fn stop(&self) -> Result<(), ReplicaError>;
}
