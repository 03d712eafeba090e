use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chat_backend::{
    BackendError, ChatId, ChatRemote, Message, MessageId, RunStatus, SenderKind, CHATS_TABLE,
    MESSAGES_TABLE,
};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Semaphore;

use crate::hub::MockFeedHub;
use crate::lock_unpoisoned;

/// Remote operation selector used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    FetchMessages,
    FetchStatus,
    Send,
    Abort,
    Clear,
}

#[derive(Default)]
struct RemoteState {
    messages: HashMap<ChatId, Vec<Message>>,
    statuses: HashMap<ChatId, RunStatus>,
    next_row_id: i64,
    failures: HashMap<MockOp, BackendError>,
    sent: Vec<Message>,
    aborts: Vec<ChatId>,
    clears: Vec<ChatId>,
    message_fetches: HashMap<ChatId, usize>,
}

/// In-memory remote chat store.
///
/// When linked to a [`MockFeedHub`], stored rows and status changes are
/// published the way a row-store push channel would publish them, including
/// the echo of rows the local user sent.
pub struct MockRemote {
    state: Mutex<RemoteState>,
    fetch_gates: Mutex<HashMap<ChatId, Arc<Semaphore>>>,
    hub: Option<Arc<MockFeedHub>>,
    agent_reply: Option<String>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
            fetch_gates: Mutex::new(HashMap::new()),
            hub: None,
            agent_reply: None,
        }
    }

    /// Publishes row changes to `hub` as they happen.
    #[must_use]
    pub fn with_hub(mut self, hub: Arc<MockFeedHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Answers every sent message with a scripted agent run: status
    /// `running`, one assistant row prefixed by `prefix`, then `completed`.
    #[must_use]
    pub fn with_agent_reply(mut self, prefix: impl Into<String>) -> Self {
        self.agent_reply = Some(prefix.into());
        self
    }

    /// Replaces the stored transcript of `chat`.
    pub fn seed_messages(&self, chat: ChatId, messages: Vec<Message>) {
        lock_unpoisoned(&self.state).messages.insert(chat, messages);
    }

    /// Sets the stored run status of `chat` without publishing it.
    pub fn set_status(&self, chat: ChatId, status: RunStatus) {
        lock_unpoisoned(&self.state).statuses.insert(chat, status);
    }

    /// Sets the stored run status of `chat` and publishes the row update.
    pub fn publish_status(&self, chat: ChatId, status: RunStatus) {
        self.set_status(chat, status.clone());
        if let Some(hub) = &self.hub {
            hub.publish_update(CHATS_TABLE, json!({ "id": chat, "status": status }));
        }
    }

    /// Appends a row authored elsewhere (agent, tool) and publishes it.
    pub fn append_message(&self, message: Message) {
        lock_unpoisoned(&self.state)
            .messages
            .entry(message.chat_id)
            .or_default()
            .push(message.clone());
        self.publish_row(&message);
    }

    /// Stores an assistant row with a fresh server id and publishes it.
    pub fn append_reply(&self, chat: ChatId, content: impl Into<String>) -> Message {
        let message = {
            let mut state = lock_unpoisoned(&self.state);
            state.next_row_id += 1;
            Message::new(state.next_row_id, chat, SenderKind::Assistant, content)
                .with_sender("assistant")
                .with_created(now_timestamp())
        };
        self.append_message(message.clone());
        message
    }

    /// Makes every call of `op` fail with `error` until [`Self::succeed`].
    pub fn fail(&self, op: MockOp, error: BackendError) {
        lock_unpoisoned(&self.state).failures.insert(op, error);
    }

    pub fn succeed(&self, op: MockOp) {
        lock_unpoisoned(&self.state).failures.remove(&op);
    }

    /// Parks transcript fetches of `chat` until [`Self::release_fetch`].
    pub fn hold_fetches(&self, chat: ChatId) {
        lock_unpoisoned(&self.fetch_gates).insert(chat, Arc::new(Semaphore::new(0)));
    }

    /// Lets the oldest parked fetch of `chat` proceed.
    pub fn release_fetch(&self, chat: ChatId) {
        if let Some(gate) = lock_unpoisoned(&self.fetch_gates).get(&chat) {
            gate.add_permits(1);
        }
    }

    /// Stops parking fetches of `chat` and releases every parked one.
    pub fn open_fetches(&self, chat: ChatId) {
        if let Some(gate) = lock_unpoisoned(&self.fetch_gates).remove(&chat) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Number of transcript fetches started for `chat`, parked ones included.
    #[must_use]
    pub fn message_fetches(&self, chat: ChatId) -> usize {
        lock_unpoisoned(&self.state)
            .message_fetches
            .get(&chat)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn stored_messages(&self, chat: ChatId) -> Vec<Message> {
        lock_unpoisoned(&self.state)
            .messages
            .get(&chat)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn stored_status(&self, chat: ChatId) -> Option<RunStatus> {
        lock_unpoisoned(&self.state).statuses.get(&chat).cloned()
    }

    /// Messages accepted by `send_message`, as the caller submitted them.
    #[must_use]
    pub fn sent(&self) -> Vec<Message> {
        lock_unpoisoned(&self.state).sent.clone()
    }

    #[must_use]
    pub fn aborts(&self) -> Vec<ChatId> {
        lock_unpoisoned(&self.state).aborts.clone()
    }

    #[must_use]
    pub fn clears(&self) -> Vec<ChatId> {
        lock_unpoisoned(&self.state).clears.clone()
    }

    fn injected_failure(&self, op: MockOp) -> Result<(), BackendError> {
        match lock_unpoisoned(&self.state).failures.get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn publish_row(&self, message: &Message) {
        let Some(hub) = &self.hub else {
            return;
        };
        match serde_json::to_value(message) {
            Ok(record) => {
                hub.publish_insert(MESSAGES_TABLE, record);
            }
            Err(error) => tracing::warn!(%error, "mock row could not be encoded"),
        }
    }

    fn run_agent_reply(&self, chat: ChatId, prompt: &str) {
        let Some(prefix) = self.agent_reply.as_deref() else {
            return;
        };
        self.publish_status(chat, RunStatus::Running);
        self.append_reply(chat, format!("{prefix}{prompt}"));
        self.publish_status(chat, RunStatus::Completed);
    }
}

#[async_trait]
impl ChatRemote for MockRemote {
    async fn fetch_messages(&self, chat: ChatId) -> Result<Vec<Message>, BackendError> {
        *lock_unpoisoned(&self.state)
            .message_fetches
            .entry(chat)
            .or_default() += 1;

        let gate = lock_unpoisoned(&self.fetch_gates).get(&chat).cloned();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.injected_failure(MockOp::FetchMessages)?;
        Ok(self.stored_messages(chat))
    }

    async fn fetch_status(&self, chat: ChatId) -> Result<Option<RunStatus>, BackendError> {
        self.injected_failure(MockOp::FetchStatus)?;
        Ok(self.stored_status(chat))
    }

    async fn send_message(&self, message: &Message) -> Result<(), BackendError> {
        self.injected_failure(MockOp::Send)?;

        let stored = {
            let mut state = lock_unpoisoned(&self.state);
            state.sent.push(message.clone());
            state.next_row_id += 1;
            let mut stored = message.clone();
            stored.id = MessageId::from(state.next_row_id);
            if stored.created.is_none() {
                stored.created = Some(now_timestamp());
            }
            state
                .messages
                .entry(message.chat_id)
                .or_default()
                .push(stored.clone());
            stored
        };

        self.publish_row(&stored);
        self.run_agent_reply(message.chat_id, &message.content);
        Ok(())
    }

    async fn abort_run(&self, chat: ChatId) -> Result<(), BackendError> {
        self.injected_failure(MockOp::Abort)?;
        lock_unpoisoned(&self.state).aborts.push(chat);
        if self.stored_status(chat).is_some_and(|status| status.is_running()) {
            self.publish_status(chat, RunStatus::Aborted);
        }
        Ok(())
    }

    async fn clear_messages(&self, chat: ChatId) -> Result<(), BackendError> {
        self.injected_failure(MockOp::Clear)?;
        let mut state = lock_unpoisoned(&self.state);
        state.clears.push(chat);
        state.messages.remove(&chat);
        Ok(())
    }
}

fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
