//! CLI subcommands that talk to the document store directly, no provider call.

use replica_core::{
    config::Config,
    message::{ConversationMessage, ConversationStatus, Sender},
    path::{chats_collection, status_document},
    traits::Provider,
};
use replica_store::{audit::AuditRecord, AuditLogger, Store};

/// Append a user message to a conversation. A running responder picks it up.
pub async fn send(store: &Store, chat_id: &str, text: &str) -> anyhow::Result<ConversationMessage> {
    let chat_id = chat_id.trim();
    if chat_id.is_empty() || chat_id.contains('/') {
        anyhow::bail!("invalid conversation id: '{chat_id}'");
    }
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("no message provided. Usage: replica send <chat-id> <message>");
    }
    Ok(store.append_message(chat_id, text, &Sender::User).await?)
}

/// Render the last `limit` messages and the status of a conversation.
pub async fn history(store: &Store, chat_id: &str, limit: usize) -> anyhow::Result<String> {
    let messages = store.recent_messages(chat_id, limit).await?;
    let total = store.message_count(chat_id).await?;
    let status = store.get_status(chat_id).await?;
    Ok(format_history(chat_id, total, &messages, status.as_ref()))
}

/// Render a health report: config, store and provider availability.
pub async fn status(
    cfg: &Config,
    config_path: &str,
    store: &Store,
    provider: &dyn Provider,
) -> String {
    let db_size = store
        .db_size()
        .await
        .map(format_bytes)
        .unwrap_or_else(|_| "unknown".to_string());

    let audit = AuditLogger::new(store.pool().clone());
    let replies = match audit.counts().await {
        Ok((ok, err)) => format!("{ok} ok, {err} failed"),
        Err(e) => format!("unknown ({e})"),
    };
    let last = match audit.latest().await {
        Ok(Some(record)) => format_audit_record(&record),
        Ok(None) => "none".to_string(),
        Err(e) => format!("unknown ({e})"),
    };

    let available = provider.is_available().await;

    format!(
        "Replica status\n\
         Config: {config_path}\n\
         Persona: {persona}\n\
         Provider: {provider} ({availability})\n\
         Model: {model}\n\
         Database: {db_path} ({db_size})\n\
         Replies: {replies}\n\
         Last: {last}",
        persona = cfg.persona.identity,
        provider = provider.name(),
        availability = if available { "available" } else { "not configured" },
        model = cfg.provider.gemini.model,
        db_path = cfg.store.db_path,
    )
}

/// One line per message, oldest first, followed by the status document.
pub fn format_history(
    chat_id: &str,
    total: i64,
    messages: &[ConversationMessage],
    status: Option<&ConversationStatus>,
) -> String {
    let mut out = format!(
        "{} ({total} messages, showing {})\n",
        chats_collection(chat_id),
        messages.len()
    );
    if messages.is_empty() {
        out.push_str("  (no messages)\n");
    }
    for m in messages {
        out.push_str(&format!(
            "  [{}] {}: {}\n",
            m.timestamp.format("%Y-%m-%d %H:%M:%S"),
            m.sender,
            m.text
        ));
    }
    match status {
        Some(s) => out.push_str(&format!(
            "{}: {} (since {})",
            status_document(chat_id),
            s.status,
            s.last_active.format("%Y-%m-%d %H:%M:%S")
        )),
        None => out.push_str(&format!("{}: unknown", status_document(chat_id))),
    }
    out
}

/// One-line summary of an audited invocation.
pub fn format_audit_record(record: &AuditRecord) -> String {
    let mut out = format!("{} [{}]", record.chat_id, record.status.as_str());
    if let Some(provider) = &record.provider {
        out.push_str(&format!(" {provider}"));
    }
    if let Some(model) = &record.model {
        out.push_str(&format!("/{model}"));
    }
    if let Some(tokens) = record.tokens_used {
        out.push_str(&format!(", {tokens} tokens"));
    }
    if let Some(ms) = record.generation_ms {
        out.push_str(&format!(", generated in {ms}ms"));
    }
    if let Some(ms) = record.processing_ms {
        out.push_str(&format!(", total {ms}ms"));
    }
    if let Some(error) = &record.error {
        out.push_str(&format!(": {error}"));
    }
    out
}

/// Format bytes into a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
