//! The event loop turning new chat documents into persona replies.
//!
//! Every creation event is handled by its own task. Invocations never block
//! each other and share no state; everything lives in the document store.

mod pipeline;

#[cfg(test)]
mod tests;

use replica_core::{
    config::{HumanizeConfig, PersonaConfig, ResponderConfig},
    message::{ConversationMessage, MessageCreated, StatusKind},
    traits::{DocumentStore, MessageSource, Provider},
};
use replica_store::audit::{AuditEntry, AuditLogger, AuditStatus};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How a single invocation ended.
#[derive(Debug)]
pub enum Outcome {
    /// The message was written by the persona itself.
    SelfTriggered,
    /// A reply was appended.
    Replied(ConversationMessage),
    /// The invocation failed; the error has been logged.
    Failed(String),
}

/// Handles message creation events for one persona.
pub struct Responder {
    pub(super) provider: Arc<dyn Provider>,
    pub(super) store: Arc<dyn DocumentStore>,
    pub(super) audit: Option<AuditLogger>,
    pub(super) persona: PersonaConfig,
    pub(super) config: ResponderConfig,
    pub(super) humanize: HumanizeConfig,
}

impl Responder {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn DocumentStore>,
        persona: PersonaConfig,
        config: ResponderConfig,
        humanize: HumanizeConfig,
    ) -> Self {
        Self {
            provider,
            store,
            audit: None,
            persona,
            config,
            humanize,
        }
    }

    /// Record every invocation in the audit log.
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Consume events from `source` until it closes or Ctrl-C is received,
    /// then wait for in-flight invocations to finish.
    pub async fn run(self: Arc<Self>, source: Arc<dyn MessageSource>) -> anyhow::Result<()> {
        info!(
            "Replica responder running | persona: {} | provider: {} | source: {}",
            self.persona.identity,
            self.provider.name(),
            source.name(),
        );

        let mut rx = source
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start source {}: {e}", source.name()))?;

        let mut inflight = JoinSet::new();

        loop {
            tokio::select! {
                maybe_event = rx.recv() => match maybe_event {
                    Some(event) => {
                        let responder = self.clone();
                        inflight.spawn(async move {
                            responder.handle(event).await;
                        });
                    }
                    None => {
                        info!("Message source closed");
                        break;
                    }
                },
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(e) = joined {
                        error!("responder task aborted: {e}");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        if let Err(e) = source.stop().await {
            warn!("failed to stop source {}: {e}", source.name());
        }

        if !inflight.is_empty() {
            info!("Waiting for {} in-flight replies...", inflight.len());
        }
        while let Some(joined) = inflight.join_next().await {
            if let Err(e) = joined {
                error!("responder task aborted: {e}");
            }
        }

        info!("Shutdown complete.");
        Ok(())
    }

    /// Process one creation event. Never returns an error: failures are
    /// logged and the event counts as handled.
    pub async fn handle(&self, event: MessageCreated) -> Outcome {
        if event.message.sender.is(&self.persona.identity) {
            debug!("[{}] ignoring own message {}", event.chat_id, event.message_id);
            return Outcome::SelfTriggered;
        }

        info!(
            "[{}] {} says: {}",
            event.chat_id,
            event.message.sender,
            preview(&event.message.text)
        );

        let started = Instant::now();
        let result = self.respond(&event).await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok((reply, meta)) => {
                info!(
                    "[{}] replied in {elapsed_ms}ms: {}",
                    event.chat_id,
                    preview(&reply.text)
                );
                self.record(AuditEntry {
                    chat_id: event.chat_id.clone(),
                    message_id: event.message_id.clone(),
                    input_text: event.message.text.clone(),
                    output_text: Some(reply.text.clone()),
                    provider: Some(meta.provider_used),
                    model: meta.model,
                    tokens_used: meta.tokens_used.map(|t| t as i64),
                    generation_ms: Some(meta.processing_time_ms as i64),
                    processing_ms: Some(elapsed_ms),
                    status: AuditStatus::Ok,
                    error: None,
                })
                .await;
                Outcome::Replied(reply)
            }
            Err(e) => {
                error!("[{}] error processing message {}: {e}", event.chat_id, event.message_id);

                if self.config.reset_status_on_failure {
                    if let Err(reset_err) =
                        self.store.set_status(&event.chat_id, StatusKind::Online).await
                    {
                        warn!("[{}] failed to reset status: {reset_err}", event.chat_id);
                    }
                }

                self.record(AuditEntry {
                    chat_id: event.chat_id.clone(),
                    message_id: event.message_id.clone(),
                    input_text: event.message.text.clone(),
                    output_text: None,
                    provider: Some(self.provider.name().to_string()),
                    model: None,
                    tokens_used: None,
                    generation_ms: None,
                    processing_ms: Some(elapsed_ms),
                    status: AuditStatus::Error,
                    error: Some(e.to_string()),
                })
                .await;
                Outcome::Failed(e.to_string())
            }
        }
    }

    async fn record(&self, entry: AuditEntry) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log(&entry).await {
                warn!("audit write failed: {e}");
            }
        }
    }
}

/// First 60 characters of a message for log lines.
fn preview(text: &str) -> String {
    if text.chars().count() > 60 {
        let truncated: String = text.chars().take(60).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}
