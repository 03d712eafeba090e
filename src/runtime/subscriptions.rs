use std::fmt;
use std::sync::Arc;

use chat_backend::{
    BackendError, ChatId, FeedEvent, FeedId, FeedSink, FeedSpec, FeedTransport, Message, RunStatus,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Which of the two per-chat feeds produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    MessageInserts,
    StatusUpdates,
}

impl FeedKind {
    #[must_use]
    pub fn spec(self, chat: ChatId) -> FeedSpec {
        match self {
            Self::MessageInserts => FeedSpec::message_inserts(chat),
            Self::StatusUpdates => FeedSpec::status_updates(chat),
        }
    }
}

/// A feed event after decoding and filtering, ready for the stores.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    Message(Message),
    Status(RunStatus),
    Dropped { feed: FeedKind, reason: String },
}

/// Receives routed updates for the chat the feeds were opened for.
pub type FeedRouter = Arc<dyn Fn(FeedUpdate) + Send + Sync>;

/// Owns one open feed and closes it exactly once when dropped.
pub struct FeedLease {
    transport: Arc<dyn FeedTransport>,
    id: FeedId,
    kind: FeedKind,
}

impl FeedLease {
    #[must_use]
    pub fn id(&self) -> FeedId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> FeedKind {
        self.kind
    }
}

impl Drop for FeedLease {
    fn drop(&mut self) {
        debug!(feed = self.id, kind = ?self.kind, "closing feed");
        self.transport.unsubscribe(self.id);
    }
}

impl fmt::Debug for FeedLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedLease")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The message-insert and status-update feeds of one chat.
#[derive(Debug)]
pub struct FeedSet {
    chat: ChatId,
    leases: Vec<FeedLease>,
}

impl FeedSet {
    #[must_use]
    pub fn chat(&self) -> ChatId {
        self.chat
    }

    #[must_use]
    pub fn feed_ids(&self) -> Vec<FeedId> {
        self.leases.iter().map(FeedLease::id).collect()
    }
}

/// Opens and holds the scoped feeds of the active chat.
///
/// At most one [`FeedSet`] is installed at a time. Opening is async and
/// happens outside the session lock, so it is split from installing:
/// [`SubscriptionManager::open`] yields a set that only becomes live once
/// [`SubscriptionManager::install`] accepts it. Sets that are never
/// installed, or are replaced, close when dropped.
pub struct SubscriptionManager {
    transport: Arc<dyn FeedTransport>,
    active: Option<FeedSet>,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(transport: Arc<dyn FeedTransport>) -> Self {
        Self {
            transport,
            active: None,
        }
    }

    #[must_use]
    pub fn transport(&self) -> Arc<dyn FeedTransport> {
        Arc::clone(&self.transport)
    }

    /// Opens both feeds for `chat`, message inserts first.
    ///
    /// `still_wanted` is checked before each subscribe; once it returns false
    /// the feeds opened so far are closed and `Ok(None)` is returned. If the
    /// second feed fails the first is closed before the error is returned.
    pub async fn open(
        transport: Arc<dyn FeedTransport>,
        chat: ChatId,
        router: FeedRouter,
        still_wanted: impl Fn() -> bool,
    ) -> Result<Option<FeedSet>, BackendError> {
        let mut leases = Vec::with_capacity(2);
        for kind in [FeedKind::MessageInserts, FeedKind::StatusUpdates] {
            if !still_wanted() {
                debug!(%chat, ?kind, opened = leases.len(), "feeds no longer wanted");
                return Ok(None);
            }
            let sink = route_to(kind, chat, Arc::clone(&router));
            let id = transport.subscribe(kind.spec(chat), sink).await?;
            debug!(%chat, feed = id, ?kind, "feed opened");
            leases.push(FeedLease {
                transport: Arc::clone(&transport),
                id,
                kind,
            });
        }
        Ok(Some(FeedSet { chat, leases }))
    }

    /// Makes `set` the live feed set and hands back the one it replaces.
    ///
    /// The caller drops the returned set once it no longer holds locks that a
    /// feed sink might need.
    #[must_use]
    pub fn install(&mut self, set: FeedSet) -> Option<FeedSet> {
        self.active.replace(set)
    }

    /// Detaches the live feed set; dropping it closes the feeds.
    #[must_use]
    pub fn take(&mut self) -> Option<FeedSet> {
        self.active.take()
    }

    #[must_use]
    pub fn active_chat(&self) -> Option<ChatId> {
        self.active.as_ref().map(FeedSet::chat)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

fn route_to(kind: FeedKind, chat: ChatId, router: FeedRouter) -> FeedSink {
    Arc::new(move |event| {
        if let Some(update) = decode_event(kind, chat, event) {
            router(update);
        }
    })
}

/// Turns a raw feed event into a store update.
///
/// Rows for another chat, undecodable rows, and `user` rows on the insert
/// feed are dropped here. The user's own rows are already in the store from
/// the optimistic send.
pub fn decode_event(kind: FeedKind, chat: ChatId, event: FeedEvent) -> Option<FeedUpdate> {
    match (kind, event) {
        (_, FeedEvent::Dropped { reason }) => Some(FeedUpdate::Dropped { feed: kind, reason }),
        (FeedKind::MessageInserts, FeedEvent::Insert { record }) => decode_message(chat, record),
        (FeedKind::StatusUpdates, FeedEvent::Update { record }) => decode_status(chat, &record),
        (kind, event) => {
            debug!(%chat, ?kind, ?event, "ignoring event outside feed scope");
            None
        }
    }
}

fn decode_message(chat: ChatId, record: Value) -> Option<FeedUpdate> {
    let message = match serde_json::from_value::<Message>(record) {
        Ok(message) => message,
        Err(error) => {
            warn!(%chat, %error, "dropping undecodable message row");
            return None;
        }
    };
    if message.chat_id != chat {
        debug!(%chat, row_chat = %message.chat_id, "dropping message row for another chat");
        return None;
    }
    if message.kind.is_user() {
        debug!(%chat, message = %message.id, "dropping user row echoed by feed");
        return None;
    }
    Some(FeedUpdate::Message(message))
}

fn decode_status(chat: ChatId, record: &Value) -> Option<FeedUpdate> {
    let same_chat = match record.get("id") {
        Some(Value::Number(id)) => id.as_i64() == Some(chat.get()),
        Some(Value::String(id)) => *id == chat.to_string(),
        _ => false,
    };
    if !same_chat {
        debug!(%chat, "dropping status row for another chat");
        return None;
    }
    match record.get("status").and_then(Value::as_str) {
        Some(status) => Some(FeedUpdate::Status(RunStatus::from(status))),
        None => {
            debug!(%chat, "status update without status column");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chat_backend::SenderKind;
    use chat_backend_mock::MockFeedHub;
    use serde_json::json;

    use super::*;
    use crate::runtime::lock_unpoisoned;

    const CHAT: ChatId = ChatId::new(42);

    fn collecting_router() -> (FeedRouter, Arc<std::sync::Mutex<Vec<FeedUpdate>>>) {
        let updates = Arc::new(std::sync::Mutex::new(Vec::new()));
        let captured = Arc::clone(&updates);
        let router: FeedRouter = Arc::new(move |update| lock_unpoisoned(&captured).push(update));
        (router, updates)
    }

    #[test]
    fn insert_rows_route_non_user_messages_only() {
        let agent = json!({"id": 2, "chat_id": 42, "type": "assistant", "content": "hello"});
        let user = json!({"id": 3, "chat_id": 42, "type": "user", "content": "hi"});

        assert_eq!(
            decode_event(
                FeedKind::MessageInserts,
                CHAT,
                FeedEvent::Insert { record: agent }
            ),
            Some(FeedUpdate::Message(Message::new(
                2,
                CHAT,
                SenderKind::Assistant,
                "hello"
            )))
        );
        assert_eq!(
            decode_event(FeedKind::MessageInserts, CHAT, FeedEvent::Insert { record: user }),
            None
        );
    }

    #[test]
    fn rows_for_other_chats_or_malformed_rows_are_dropped() {
        let other_chat = json!({"id": 2, "chat_id": 7, "type": "assistant", "content": "x"});
        let malformed = json!({"chat_id": 42});
        let other_status = json!({"id": 7, "status": "running"});

        assert!(decode_event(
            FeedKind::MessageInserts,
            CHAT,
            FeedEvent::Insert { record: other_chat }
        )
        .is_none());
        assert!(decode_event(
            FeedKind::MessageInserts,
            CHAT,
            FeedEvent::Insert { record: malformed }
        )
        .is_none());
        assert!(decode_event(
            FeedKind::StatusUpdates,
            CHAT,
            FeedEvent::Update {
                record: other_status
            }
        )
        .is_none());
    }

    #[test]
    fn status_rows_decode_numeric_and_textual_ids() {
        for id in [json!(42), json!("42")] {
            let record = json!({"id": id, "status": "failed"});
            assert_eq!(
                decode_event(FeedKind::StatusUpdates, CHAT, FeedEvent::Update { record }),
                Some(FeedUpdate::Status(RunStatus::Failed))
            );
        }
    }

    #[test]
    fn dropped_events_name_their_feed() {
        assert_eq!(
            decode_event(
                FeedKind::StatusUpdates,
                CHAT,
                FeedEvent::Dropped {
                    reason: "socket closed".to_string()
                }
            ),
            Some(FeedUpdate::Dropped {
                feed: FeedKind::StatusUpdates,
                reason: "socket closed".to_string()
            })
        );
    }

    #[tokio::test]
    async fn open_routes_events_and_dropping_the_set_closes_each_feed_once() {
        let hub = Arc::new(MockFeedHub::new());
        let (router, updates) = collecting_router();

        let set = SubscriptionManager::open(
            Arc::clone(&hub) as Arc<dyn FeedTransport>,
            CHAT,
            router,
            || true,
        )
        .await
        .expect("open should succeed")
        .expect("feeds are wanted");
        assert_eq!(set.chat(), CHAT);
        assert_eq!(hub.active_count(), 2);

        hub.publish_update(
            chat_backend::CHATS_TABLE,
            json!({"id": 42, "status": "running"}),
        );
        assert_eq!(
            lock_unpoisoned(&updates).clone(),
            vec![FeedUpdate::Status(RunStatus::Running)]
        );

        let mut manager = SubscriptionManager::new(Arc::clone(&hub) as Arc<dyn FeedTransport>);
        assert!(manager.install(set).is_none());
        assert_eq!(manager.active_chat(), Some(CHAT));

        drop(manager.take());
        assert!(!manager.is_open());
        assert_eq!(hub.active_count(), 0);
        assert_eq!(hub.closed_count(), 2);
    }

    #[tokio::test]
    async fn failing_second_feed_closes_the_first() {
        let hub = Arc::new(MockFeedHub::new());
        hub.fail_next_subscribe_to(chat_backend::CHATS_TABLE, BackendError::Closed);
        let (router, _) = collecting_router();

        let result = SubscriptionManager::open(
            Arc::clone(&hub) as Arc<dyn FeedTransport>,
            CHAT,
            router,
            || true,
        )
        .await;

        assert!(matches!(result, Err(BackendError::Closed)));
        assert_eq!(hub.opened_count(), 1);
        assert_eq!(hub.closed_count(), 1);
        assert_eq!(hub.active_count(), 0);
    }

    #[tokio::test]
    async fn unwanted_open_stops_before_the_next_subscribe_and_closes_what_it_opened() {
        let hub = Arc::new(MockFeedHub::new());
        let (router, _) = collecting_router();
        let checks = AtomicUsize::new(0);

        let result = SubscriptionManager::open(
            Arc::clone(&hub) as Arc<dyn FeedTransport>,
            CHAT,
            router,
            || checks.fetch_add(1, Ordering::SeqCst) == 0,
        )
        .await;

        assert!(matches!(result, Ok(None)));
        assert_eq!(hub.opened_count(), 1);
        assert_eq!(hub.closed_count(), 1);
        assert_eq!(hub.active_count(), 0);
    }

    #[test]
    fn insert_rows_with_textual_chat_ids_are_routed() {
        let record = json!({"id": 4, "chat_id": "42", "type": "tool", "content": "ran"});

        assert_eq!(
            decode_event(FeedKind::MessageInserts, CHAT, FeedEvent::Insert { record }),
            Some(FeedUpdate::Message(Message::new(
                4,
                CHAT,
                SenderKind::Tool,
                "ran"
            )))
        );
    }
}
