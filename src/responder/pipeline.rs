//! The reply pipeline run for every message that passes the self-trigger guard.

use super::Responder;
use replica_core::{
    context::Context,
    error::ReplicaError,
    humanize::sample_latency,
    message::{ConversationMessage, MessageCreated, ReplyMetadata, Sender, StatusKind},
};
use tracing::debug;

impl Responder {
    /// Run steps 1-8 for one event. Returns the stored reply and how it was generated.
    ///
    /// Earlier writes are not rolled back when a later step fails.
    pub(super) async fn respond(
        &self,
        event: &MessageCreated,
    ) -> Result<(ConversationMessage, ReplyMetadata), ReplicaError> {
        let chat_id = event.chat_id.as_str();

        // --- 1. ANNOUNCE TYPING ---
        self.store.set_status(chat_id, StatusKind::Typing).await?;

        // --- 2. GATHER CONTEXT ---
        // The triggering message is already stored, so it closes the window.
        let window = self
            .store
            .recent_messages(chat_id, self.config.history_limit)
            .await?;
        let context = Context::from_window(
            &self.persona.instruction,
            &window,
            &event.message.text,
        );
        debug!("[{chat_id}] context: {} history turns", context.history.len());

        // --- 3. GENERATE ---
        let reply = self.provider.complete(&context).await?;
        if reply.text.trim().is_empty() {
            return Err(ReplicaError::Generation(format!(
                "{} returned an empty reply",
                self.provider.name()
            )));
        }

        // --- 4. POST-PROCESS ---
        let text = reply.text.to_lowercase();

        // --- 5. HUMANIZE TIMING ---
        let delay = {
            let mut rng = rand::thread_rng();
            sample_latency(text.chars().count(), &self.humanize, &mut rng)
        };
        debug!("[{chat_id}] holding reply for {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;

        // --- 6. TYPO ---
        let text = {
            let mut rng = rand::thread_rng();
            self.humanize.mutate(&text, &mut rng)
        };

        // --- 7. PERSIST REPLY ---
        let persona = Sender::from(self.persona.identity.as_str());
        let stored = self.store.append_message(chat_id, &text, &persona).await?;

        // --- 8. RESET STATUS ---
        self.store.set_status(chat_id, StatusKind::Online).await?;

        Ok((stored, reply.metadata))
    }
}
