use super::*;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use replica_core::{
    config::TypoMode,
    context::{Context, Role},
    error::ReplicaError,
    message::{ConversationStatus, ModelReply, ReplyMetadata, Sender},
};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

// -----------------------------------------------------------------------
// Test doubles
// -----------------------------------------------------------------------

/// Shared, ordered record of every call made against the doubles.
type OpLog = Arc<Mutex<Vec<String>>>;

/// Provider that records contexts and answers with a canned result.
struct MockProvider {
    reply: Result<String, String>,
    contexts: Mutex<Vec<Context>>,
    ops: OpLog,
}

impl MockProvider {
    fn replying(text: &str, ops: OpLog) -> Self {
        Self {
            reply: Ok(text.to_string()),
            contexts: Mutex::new(Vec::new()),
            ops,
        }
    }

    fn failing(ops: OpLog) -> Self {
        Self {
            reply: Err("backend unavailable".to_string()),
            contexts: Mutex::new(Vec::new()),
            ops,
        }
    }

    fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, context: &Context) -> Result<ModelReply, ReplicaError> {
        self.ops.lock().unwrap().push("generate".to_string());
        self.contexts.lock().unwrap().push(context.clone());
        match &self.reply {
            Ok(text) => Ok(ModelReply {
                text: text.clone(),
                metadata: ReplyMetadata {
                    provider_used: "mock".into(),
                    tokens_used: Some(12),
                    processing_time_ms: 5,
                    model: Some("mock-1".into()),
                },
            }),
            Err(e) => Err(ReplicaError::Generation(e.clone())),
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// In-memory document store that records every write.
struct MemoryStore {
    chats: Mutex<HashMap<String, Vec<ConversationMessage>>>,
    status: Mutex<HashMap<String, ConversationStatus>>,
    status_writes: Mutex<Vec<(String, StatusKind, DateTime<Utc>)>>,
    next_id: Mutex<u64>,
    fail_status_writes: bool,
    ops: OpLog,
}

impl MemoryStore {
    fn new(ops: OpLog) -> Self {
        Self {
            chats: Mutex::new(HashMap::new()),
            status: Mutex::new(HashMap::new()),
            status_writes: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
            fail_status_writes: false,
            ops,
        }
    }

    /// Seed a message without logging it as an operation.
    fn seed(&self, chat_id: &str, sender: &str, text: &str, at: DateTime<Utc>) -> ConversationMessage {
        let msg = ConversationMessage {
            id: self.fresh_id(),
            text: text.to_string(),
            sender: Sender::from(sender),
            timestamp: at,
        };
        self.chats
            .lock()
            .unwrap()
            .entry(chat_id.to_string())
            .or_default()
            .push(msg.clone());
        msg
    }

    fn fresh_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("doc-{next}")
    }

    fn messages(&self, chat_id: &str) -> Vec<ConversationMessage> {
        self.chats
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    fn writes(&self) -> Vec<(String, StatusKind, DateTime<Utc>)> {
        self.status_writes.lock().unwrap().clone()
    }

    fn current_status(&self, chat_id: &str) -> Option<StatusKind> {
        self.status.lock().unwrap().get(chat_id).map(|s| s.status)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, ReplicaError> {
        self.ops.lock().unwrap().push("read".to_string());
        let mut all = self.messages(chat_id);
        all.sort_by_key(|m| m.timestamp);
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn append_message(
        &self,
        chat_id: &str,
        text: &str,
        sender: &Sender,
    ) -> Result<ConversationMessage, ReplicaError> {
        self.ops.lock().unwrap().push("append".to_string());
        let newest = self.messages(chat_id).iter().map(|m| m.timestamp).max();
        let now = Utc::now();
        let timestamp = match newest {
            Some(ts) if ts > now => ts,
            _ => now,
        };
        let msg = ConversationMessage {
            id: self.fresh_id(),
            text: text.to_string(),
            sender: sender.clone(),
            timestamp,
        };
        self.chats
            .lock()
            .unwrap()
            .entry(chat_id.to_string())
            .or_default()
            .push(msg.clone());
        Ok(msg)
    }

    async fn set_status(&self, chat_id: &str, status: StatusKind) -> Result<(), ReplicaError> {
        self.ops.lock().unwrap().push(format!("status:{status}"));
        if self.fail_status_writes {
            return Err(ReplicaError::Store("permission denied".into()));
        }
        let now = Utc::now();
        self.status_writes
            .lock()
            .unwrap()
            .push((chat_id.to_string(), status, now));
        self.status.lock().unwrap().insert(
            chat_id.to_string(),
            ConversationStatus {
                status,
                last_active: now,
            },
        );
        Ok(())
    }

    async fn get_status(&self, chat_id: &str) -> Result<Option<ConversationStatus>, ReplicaError> {
        Ok(self.status.lock().unwrap().get(chat_id).cloned())
    }
}

/// Source that replays a fixed list of events, then closes.
struct ScriptedSource {
    rx: tokio::sync::Mutex<Option<mpsc::Receiver<MessageCreated>>>,
    stopped: Mutex<bool>,
}

impl ScriptedSource {
    fn new(events: Vec<MessageCreated>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for ev in events {
            tx.try_send(ev).unwrap();
        }
        Self {
            rx: tokio::sync::Mutex::new(Some(rx)),
            stopped: Mutex::new(false),
        }
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self) -> Result<mpsc::Receiver<MessageCreated>, ReplicaError> {
        self.rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ReplicaError::Store("already started".into()))
    }

    async fn stop(&self) -> Result<(), ReplicaError> {
        *self.stopped.lock().unwrap() = true;
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------

/// Humanization with no delay and no typos, so tests run instantly and
/// assert exact text.
fn instant_humanize() -> HumanizeConfig {
    HumanizeConfig {
        ms_per_char: 0,
        thinking_min_ms: 0,
        thinking_max_ms: 0,
        typo: TypoMode::Off,
        typo_probability: 0.0,
    }
}

fn persona() -> PersonaConfig {
    PersonaConfig {
        identity: "rohan".into(),
        instruction: "you are rohan, lowercase only".into(),
        instruction_file: None,
    }
}

fn responder(provider: Arc<MockProvider>, store: Arc<MemoryStore>) -> Responder {
    Responder::new(
        provider,
        store,
        persona(),
        ResponderConfig::default(),
        instant_humanize(),
    )
}

fn event_for(chat_id: &str, msg: ConversationMessage) -> MessageCreated {
    MessageCreated {
        chat_id: chat_id.to_string(),
        message_id: msg.id.clone(),
        message: msg,
    }
}

/// Seed alternating user/persona turns, then the triggering user message.
fn seed_conversation(store: &MemoryStore, chat_id: &str, prior: usize, text: &str) -> MessageCreated {
    let base = Utc::now() - Duration::minutes(10);
    for i in 0..prior {
        let sender = if i % 2 == 0 { "user" } else { "rohan" };
        store.seed(chat_id, sender, &format!("turn {i}"), base + Duration::seconds(i as i64));
    }
    let trigger = store.seed(
        chat_id,
        "user",
        text,
        base + Duration::seconds(prior as i64 + 1),
    );
    event_for(chat_id, trigger)
}

// -----------------------------------------------------------------------
// Guard
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_own_message_is_ignored() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("hi", ops.clone()));
    let store = Arc::new(MemoryStore::new(ops.clone()));
    let own = store.seed("c1", "rohan", "my reply", Utc::now());

    let outcome = responder(provider.clone(), store.clone())
        .handle(event_for("c1", own))
        .await;

    assert!(matches!(outcome, Outcome::SelfTriggered));
    assert_eq!(provider.calls(), 0);
    assert!(store.writes().is_empty());
    assert!(ops.lock().unwrap().is_empty());
    assert_eq!(store.messages("c1").len(), 1);
}

#[tokio::test]
async fn test_other_named_sender_is_answered() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("ok", ops.clone()));
    let store = Arc::new(MemoryStore::new(ops.clone()));
    let msg = store.seed("c1", "moderator", "hello rohan", Utc::now());

    let outcome = responder(provider.clone(), store)
        .handle(event_for("c1", msg))
        .await;
    assert!(matches!(outcome, Outcome::Replied(_)));
    assert_eq!(provider.calls(), 1);
}

// -----------------------------------------------------------------------
// Happy path
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_are_you_a_bot_scenario() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("LOL what Weird question", ops.clone()));
    let store = Arc::new(MemoryStore::new(ops.clone()));
    let event = seed_conversation(&store, "c1", 3, "are you a bot");

    let outcome = responder(provider.clone(), store.clone())
        .handle(event)
        .await;

    let reply = match outcome {
        Outcome::Replied(reply) => reply,
        other => panic!("expected a reply, got {other:?}"),
    };
    assert_eq!(reply.text, "lol what weird question");
    assert!(reply.sender.is("rohan"));

    // Persisted as the newest document.
    let stored = store.messages("c1");
    assert_eq!(stored.len(), 5);
    assert_eq!(stored.last().unwrap(), &reply);

    // typing strictly before online, and the final document says online.
    let writes = store.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].1, StatusKind::Typing);
    assert_eq!(writes[1].1, StatusKind::Online);
    assert!(writes[0].2 <= writes[1].2);
    assert_eq!(store.current_status("c1"), Some(StatusKind::Online));

    assert_eq!(
        *ops.lock().unwrap(),
        vec!["status:typing", "read", "generate", "append", "status:online"]
    );
}

#[tokio::test]
async fn test_context_carries_instruction_and_history() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("nah", ops.clone()));
    let store = Arc::new(MemoryStore::new(ops));
    let event = seed_conversation(&store, "c1", 3, "are you a bot");

    responder(provider.clone(), store).handle(event).await;

    let contexts = provider.contexts.lock().unwrap();
    let ctx = &contexts[0];
    assert_eq!(ctx.system_instruction, "you are rohan, lowercase only");
    assert_eq!(ctx.current_message, "are you a bot");
    let turns: Vec<(Role, &str)> = ctx
        .history
        .iter()
        .map(|e| (e.role, e.content.as_str()))
        .collect();
    // The stored trigger closes the window and is also the new user turn.
    assert_eq!(
        turns,
        vec![
            (Role::User, "turn 0"),
            (Role::Model, "turn 1"),
            (Role::User, "turn 2"),
            (Role::User, "are you a bot"),
        ]
    );
}

#[tokio::test]
async fn test_history_window_is_capped_and_ordered() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("fr", ops.clone()));
    let store = Arc::new(MemoryStore::new(ops));
    let event = seed_conversation(&store, "c1", 25, "still there?");

    responder(provider.clone(), store).handle(event).await;

    let contexts = provider.contexts.lock().unwrap();
    let history = &contexts[0].history;
    assert_eq!(history.len(), 10);
    // The newest ten stored messages, oldest first, ending with the trigger.
    let mut expected: Vec<String> = (16..25).map(|i| format!("turn {i}")).collect();
    expected.push("still there?".to_string());
    let got: Vec<String> = history.iter().map(|e| e.content.clone()).collect();
    assert_eq!(got, expected);
    for entry in &history[..9] {
        let idx: usize = entry.content["turn ".len()..].parse().unwrap();
        let expected_role = if idx % 2 == 0 { Role::User } else { Role::Model };
        assert_eq!(entry.role, expected_role);
    }
    assert_eq!(history[9].role, Role::User);
}

#[tokio::test]
async fn test_custom_history_limit() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("k", ops.clone()));
    let store = Arc::new(MemoryStore::new(ops));
    let event = seed_conversation(&store, "c1", 6, "yo");

    let r = Responder::new(
        provider.clone(),
        store,
        persona(),
        ResponderConfig {
            history_limit: 4,
            ..Default::default()
        },
        instant_humanize(),
    );
    r.handle(event).await;

    let contexts = provider.contexts.lock().unwrap();
    assert_eq!(contexts[0].history.len(), 4);
    assert_eq!(contexts[0].history[2].content, "turn 5");
    assert_eq!(contexts[0].history[3].content, "yo");
}

#[tokio::test]
async fn test_reply_with_typo_is_one_adjacent_swap() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("lol what weird question", ops.clone()));
    let store = Arc::new(MemoryStore::new(ops));
    let event = seed_conversation(&store, "c1", 3, "are you a bot");

    let r = Responder::new(
        provider,
        store,
        persona(),
        ResponderConfig::default(),
        HumanizeConfig {
            typo: TypoMode::AdjacentSwap,
            typo_probability: 1.0,
            ..instant_humanize()
        },
    );
    let reply = match r.handle(event).await {
        Outcome::Replied(reply) => reply,
        other => panic!("expected a reply, got {other:?}"),
    };

    let original: Vec<char> = "lol what weird question".chars().collect();
    let got: Vec<char> = reply.text.chars().collect();
    assert_eq!(got.len(), original.len());
    let diffs: Vec<usize> = (0..got.len()).filter(|&i| got[i] != original[i]).collect();
    assert!(diffs.is_empty() || (diffs.len() == 2 && diffs[1] == diffs[0] + 1));
    assert_eq!(reply.text, reply.text.to_lowercase());
}

#[tokio::test]
async fn test_reply_is_delayed_by_humanized_latency() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("abcde", ops.clone()));
    let store = Arc::new(MemoryStore::new(ops));
    let event = seed_conversation(&store, "c1", 0, "hi");

    let r = Responder::new(
        provider,
        store,
        persona(),
        ResponderConfig::default(),
        HumanizeConfig {
            ms_per_char: 10,
            thinking_min_ms: 20,
            thinking_max_ms: 20,
            ..instant_humanize()
        },
    );
    let started = std::time::Instant::now();
    r.handle(event).await;
    // 5 chars * 10ms + 20ms
    assert!(started.elapsed() >= std::time::Duration::from_millis(70));
}

// -----------------------------------------------------------------------
// Failures
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_model_error_leaves_status_typing() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::failing(ops.clone()));
    let store = Arc::new(MemoryStore::new(ops.clone()));
    let event = seed_conversation(&store, "c1", 3, "are you a bot");

    let outcome = responder(provider, store.clone()).handle(event).await;

    assert!(matches!(outcome, Outcome::Failed(ref e) if e.contains("backend unavailable")));
    assert_eq!(store.messages("c1").len(), 4, "no reply appended");
    assert_eq!(store.current_status("c1"), Some(StatusKind::Typing));
    assert_eq!(
        *ops.lock().unwrap(),
        vec!["status:typing", "read", "generate"]
    );
}

#[tokio::test]
async fn test_model_error_resets_status_when_enabled() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::failing(ops.clone()));
    let store = Arc::new(MemoryStore::new(ops));
    let event = seed_conversation(&store, "c1", 1, "hello?");

    let r = Responder::new(
        provider,
        store.clone(),
        persona(),
        ResponderConfig {
            reset_status_on_failure: true,
            ..Default::default()
        },
        instant_humanize(),
    );
    let outcome = r.handle(event).await;

    assert!(matches!(outcome, Outcome::Failed(_)));
    assert_eq!(store.messages("c1").len(), 2);
    assert_eq!(store.current_status("c1"), Some(StatusKind::Online));
}

#[tokio::test]
async fn test_empty_model_reply_is_generation_failure() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("   ", ops.clone()));
    let store = Arc::new(MemoryStore::new(ops));
    let event = seed_conversation(&store, "c1", 0, "hi");

    let outcome = responder(provider, store.clone()).handle(event).await;
    assert!(matches!(outcome, Outcome::Failed(ref e) if e.contains("empty")));
    assert_eq!(store.messages("c1").len(), 1);
}

#[tokio::test]
async fn test_status_write_failure_skips_model() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("hi", ops.clone()));
    let mut store = MemoryStore::new(ops);
    store.fail_status_writes = true;
    let store = Arc::new(store);
    let event = seed_conversation(&store, "c1", 0, "hi");

    let outcome = responder(provider.clone(), store.clone()).handle(event).await;
    assert!(matches!(outcome, Outcome::Failed(ref e) if e.contains("permission denied")));
    assert_eq!(provider.calls(), 0);
    assert_eq!(store.messages("c1").len(), 1);
}

// -----------------------------------------------------------------------
// Event loop and real store
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_run_handles_every_event_then_stops_source() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("sup", ops.clone()));
    let store = Arc::new(MemoryStore::new(ops));
    let a = seed_conversation(&store, "a", 0, "hey");
    let b = seed_conversation(&store, "b", 0, "yo");
    let own = store.seed("a", "rohan", "earlier reply", Utc::now());
    let source = Arc::new(ScriptedSource::new(vec![a, b, event_for("a", own)]));

    let r = Arc::new(responder(provider.clone(), store.clone()));
    r.run(source.clone()).await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert_eq!(store.current_status("a"), Some(StatusKind::Online));
    assert_eq!(store.current_status("b"), Some(StatusKind::Online));
    assert!(*source.stopped.lock().unwrap());
}

#[tokio::test]
async fn test_end_to_end_with_sqlite_store() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::replying("Bro Im On My Phone", ops));
    let store = replica_store::Store::open_in_memory().await.unwrap();
    let audit = AuditLogger::new(store.pool().clone());

    for i in 0..3 {
        let sender = if i % 2 == 0 { Sender::User } else { Sender::from("rohan") };
        store
            .append_message("chat-1", &format!("turn {i}"), &sender)
            .await
            .unwrap();
    }
    let trigger = store
        .append_message("chat-1", "write my essay", &Sender::User)
        .await
        .unwrap();

    let r = Responder::new(
        provider.clone(),
        Arc::new(store.clone()),
        persona(),
        ResponderConfig::default(),
        instant_humanize(),
    )
    .with_audit(audit.clone());

    let outcome = r.handle(event_for("chat-1", trigger)).await;
    assert!(matches!(outcome, Outcome::Replied(_)));

    let window = store.recent_messages("chat-1", 10).await.unwrap();
    let last = window.last().unwrap();
    assert_eq!(last.text, "bro im on my phone");
    assert!(last.sender.is("rohan"));

    let status = store.get_status("chat-1").await.unwrap().unwrap();
    assert_eq!(status.status, StatusKind::Online);

    let history = provider.contexts.lock().unwrap()[0].history.clone();
    assert_eq!(history.len(), 4);
    assert_eq!(history[3].content, "write my essay");

    assert_eq!(audit.counts().await.unwrap(), (1, 0));
    let latest = audit.latest().await.unwrap().unwrap();
    assert_eq!(latest.chat_id, "chat-1");
    assert_eq!(latest.provider.as_deref(), Some("mock"));
    assert_eq!(latest.model.as_deref(), Some("mock-1"));
    assert_eq!(latest.tokens_used, Some(12));
    assert_eq!(latest.generation_ms, Some(5));
}

#[tokio::test]
async fn test_failed_invocation_is_audited() {
    let ops: OpLog = Arc::default();
    let provider = Arc::new(MockProvider::failing(ops));
    let store = replica_store::Store::open_in_memory().await.unwrap();
    let audit = AuditLogger::new(store.pool().clone());
    let trigger = store
        .append_message("chat-1", "hello", &Sender::User)
        .await
        .unwrap();

    let r = Responder::new(
        provider,
        Arc::new(store.clone()),
        persona(),
        ResponderConfig::default(),
        instant_humanize(),
    )
    .with_audit(audit.clone());
    r.handle(event_for("chat-1", trigger)).await;

    assert_eq!(audit.counts().await.unwrap(), (0, 1));
    let status = store.get_status("chat-1").await.unwrap().unwrap();
    assert_eq!(status.status, StatusKind::Typing);
}

#[test]
fn test_preview_truncates_long_text() {
    let long = "a".repeat(100);
    let p = preview(&long);
    assert!(p.ends_with("..."));
    assert_eq!(p.chars().count(), 63);
    assert_eq!(preview("short"), "short");
}
