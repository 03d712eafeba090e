use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chat_api::ChatApiError;
use chat_backend::{
    BackendError, ChatId, FeedEvent, FeedEventKind, FeedId, FeedSink, FeedSpec, FeedTransport,
    Message, MessageId, RunStatus, CHATS_TABLE, MESSAGES_TABLE,
};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{map_api_error, ChatTransport};

/// What one polling feed watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollTarget {
    MessageInserts(ChatId),
    StatusUpdates(ChatId),
}

impl PollTarget {
    fn from_spec(spec: &FeedSpec) -> Result<Self, BackendError> {
        let chat = spec
            .filter
            .value
            .parse::<i64>()
            .map(ChatId::new)
            .map_err(|_| unsupported(spec))?;

        match (spec.table.as_str(), spec.event, spec.filter.column.as_str()) {
            (MESSAGES_TABLE, FeedEventKind::Insert, "chat_id") => Ok(Self::MessageInserts(chat)),
            (CHATS_TABLE, FeedEventKind::Update, "id") => Ok(Self::StatusUpdates(chat)),
            _ => Err(unsupported(spec)),
        }
    }
}

/// Last observed state of one polled scope.
enum PollCursor {
    Messages(HashSet<MessageId>),
    Status(Option<RunStatus>),
}

/// `FeedTransport` that emulates row feeds by polling the chat API.
///
/// The poll made while subscribing replays what already exists: every current
/// message row as `Insert` and the current status as `Update`. Rows written
/// between a snapshot fetch and the subscribe are therefore not lost;
/// subscribers merge by id, so replayed snapshot rows are no-ops. Later polls
/// emit `Insert` for unseen message ids and `Update` when the chat's status
/// differs from the previous poll. Failed polls are logged and retried on the
/// next tick without closing the feed.
pub struct PollingFeedTransport {
    transport: Arc<dyn ChatTransport>,
    interval: Duration,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<FeedId, JoinHandle<()>>>,
}

impl PollingFeedTransport {
    pub(crate) fn new(transport: Arc<dyn ChatTransport>, interval: Duration) -> Self {
        Self {
            transport,
            interval,
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Number of feeds with a live poll task.
    pub fn active_count(&self) -> usize {
        lock_unpoisoned(&self.tasks).len()
    }
}

#[async_trait]
impl FeedTransport for PollingFeedTransport {
    async fn subscribe(&self, spec: FeedSpec, sink: FeedSink) -> Result<FeedId, BackendError> {
        let target = PollTarget::from_spec(&spec)?;
        let cursor = poll_once(self.transport.as_ref(), target, None, &sink)
            .await
            .map_err(|(_, error)| map_api_error(error))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let transport = Arc::clone(&self.transport);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut cursor = Some(cursor);
            loop {
                tokio::time::sleep(interval).await;
                match poll_once(transport.as_ref(), target, cursor.take(), &sink).await {
                    Ok(next) => cursor = Some(next),
                    Err((previous, error)) => {
                        warn!(feed = id, %error, "feed poll failed");
                        cursor = previous;
                    }
                }
            }
        });

        debug!(feed = id, scope = %spec, "polling feed opened");
        lock_unpoisoned(&self.tasks).insert(id, handle);
        Ok(id)
    }

    fn unsubscribe(&self, id: FeedId) {
        if let Some(handle) = lock_unpoisoned(&self.tasks).remove(&id) {
            handle.abort();
            debug!(feed = id, "polling feed closed");
        }
    }
}

impl Drop for PollingFeedTransport {
    fn drop(&mut self) {
        for (_, handle) in lock_unpoisoned(&self.tasks).drain() {
            handle.abort();
        }
    }
}

/// Polls `target` once. Without a previous cursor the current state is
/// replayed.
///
/// On failure the previous cursor is handed back so the next tick compares
/// against the last successful poll.
async fn poll_once(
    transport: &dyn ChatTransport,
    target: PollTarget,
    previous: Option<PollCursor>,
    sink: &FeedSink,
) -> Result<PollCursor, PollFailure> {
    match target {
        PollTarget::MessageInserts(chat) => {
            let rows = match transport.fetch_messages(chat).await {
                Ok(rows) => rows,
                Err(error) => return Err((previous, error)),
            };
            let mut seen = match previous {
                Some(PollCursor::Messages(seen)) => seen,
                _ => HashSet::new(),
            };
            for row in rows {
                if seen.insert(row.id.clone()) {
                    emit_insert(sink, &row);
                }
            }
            Ok(PollCursor::Messages(seen))
        }
        PollTarget::StatusUpdates(chat) => {
            let status = match transport.fetch_status(chat).await {
                Ok(status) => status,
                Err(error) => return Err((previous, error)),
            };
            let changed = match (&previous, &status) {
                (_, None) => false,
                (Some(PollCursor::Status(last)), Some(current)) => last.as_ref() != Some(current),
                (_, Some(_)) => true,
            };
            if let (true, Some(current)) = (changed, &status) {
                sink(FeedEvent::Update {
                    record: json!({ "id": chat, "status": current }),
                });
            }
            Ok(PollCursor::Status(status))
        }
    }
}

type PollFailure = (Option<PollCursor>, ChatApiError);

fn emit_insert(sink: &FeedSink, row: &Message) {
    match serde_json::to_value(row) {
        Ok(record) => sink(FeedEvent::Insert { record }),
        Err(error) => warn!(%error, message = %row.id, "polled row could not be encoded"),
    }
}

fn unsupported(spec: &FeedSpec) -> BackendError {
    BackendError::NotConfigured(format!("polling cannot serve feed scope {spec}"))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
