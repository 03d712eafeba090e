#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chat_backend::{
    BackendError, ChatId, FeedEvent, FeedId, FeedSink, FeedSpec, FeedTransport, Message,
    SenderKind,
};
use chat_backend_mock::{MockFeedHub, MockRemote};
use chat_session::{
    LoadOutcome, Notification, NotificationQueue, SessionConfig, SessionController,
};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

pub const CHAT_A: ChatId = ChatId::new(42);
pub const CHAT_B: ChatId = ChatId::new(43);

/// Session wired to the in-memory backend.
pub struct Harness {
    pub remote: Arc<MockRemote>,
    pub hub: Arc<MockFeedHub>,
    pub host: Arc<NotificationQueue>,
    pub session: SessionController,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let hub = Arc::new(MockFeedHub::new());
        let remote = Arc::new(MockRemote::new().with_hub(Arc::clone(&hub)));
        Self::assemble(remote, hub, config)
    }

    /// Backend whose simulated agent answers every message.
    pub fn with_agent(prefix: &str) -> Self {
        let hub = Arc::new(MockFeedHub::new());
        let remote = Arc::new(
            MockRemote::new()
                .with_hub(Arc::clone(&hub))
                .with_agent_reply(prefix),
        );
        Self::assemble(remote, hub, SessionConfig::default())
    }

    fn assemble(remote: Arc<MockRemote>, hub: Arc<MockFeedHub>, config: SessionConfig) -> Self {
        let host = Arc::new(NotificationQueue::new());
        let session = SessionController::new(
            Handle::current(),
            Arc::clone(&remote) as _,
            Arc::clone(&hub) as _,
            Arc::clone(&host) as _,
            config,
        );
        Self {
            remote,
            hub,
            host,
            session,
        }
    }

    /// Selects `chat` and waits for its load to finish.
    pub async fn open(&self, chat: ChatId) -> LoadOutcome {
        self.session
            .set_active_chat(chat)
            .wait()
            .await
            .expect("load task should complete")
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.host.drain()
    }
}

pub fn agent(id: i64, chat: ChatId, content: &str) -> Message {
    Message::new(id, chat, SenderKind::Assistant, content).with_sender("agent")
}

pub fn contents(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|message| message.content.clone())
        .collect()
}

/// Yields to spawned tasks until `condition` holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached after yielding to spawned tasks");
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Feed call observed by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCall {
    Subscribe(String),
    Unsubscribe(FeedId),
}

/// Transport that logs every call and keeps sinks reachable after
/// unsubscribe, like a push channel still flushing its buffer.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<FeedCall>>,
    sinks: Mutex<Vec<(FeedId, FeedSpec, FeedSink)>>,
    held: Mutex<Option<(FeedSpec, Arc<Semaphore>)>>,
}

impl RecordingTransport {
    /// Makes subscribes for `spec` wait until a permit is added to the
    /// returned gate. The call is logged before it waits.
    pub fn hold_subscribe(&self, spec: FeedSpec) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *lock_unpoisoned(&self.held) = Some((spec, Arc::clone(&gate)));
        gate
    }

    pub fn calls(&self) -> Vec<FeedCall> {
        lock_unpoisoned(&self.calls).clone()
    }

    /// Delivers `event` to every sink ever registered for `spec`.
    pub fn deliver(&self, spec: &FeedSpec, event: FeedEvent) {
        let sinks: Vec<FeedSink> = lock_unpoisoned(&self.sinks)
            .iter()
            .filter(|(_, known, _)| known == spec)
            .map(|(_, _, sink)| Arc::clone(sink))
            .collect();
        for sink in sinks {
            sink(event.clone());
        }
    }
}

#[async_trait]
impl FeedTransport for RecordingTransport {
    async fn subscribe(&self, spec: FeedSpec, sink: FeedSink) -> Result<FeedId, BackendError> {
        lock_unpoisoned(&self.calls).push(FeedCall::Subscribe(spec.to_string()));
        let gate = lock_unpoisoned(&self.held)
            .as_ref()
            .filter(|(held, _)| *held == spec)
            .map(|(_, gate)| Arc::clone(gate));
        if let Some(gate) = gate {
            gate.acquire().await.map_err(|_| BackendError::Closed)?.forget();
        }

        let mut sinks = lock_unpoisoned(&self.sinks);
        let id = sinks.len() as FeedId + 1;
        sinks.push((id, spec, sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: FeedId) {
        lock_unpoisoned(&self.calls).push(FeedCall::Unsubscribe(id));
    }
}
