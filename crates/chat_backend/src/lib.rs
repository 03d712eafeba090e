//! Transport-agnostic collaborator contract for chat sessions.
//!
//! This crate defines only the shared chat/transcript types and the three
//! capabilities a session engine consumes: request/response access to the
//! remote store ([`ChatRemote`]), scoped row-change feeds ([`FeedTransport`]),
//! and read-only chat metadata lookup ([`ChatDirectory`]). It excludes HTTP
//! details, push-protocol framing, and session orchestration.

mod error;
mod feed;
mod model;

use async_trait::async_trait;

pub use error::BackendError;
pub use feed::{
    FeedEvent, FeedEventKind, FeedFilter, FeedId, FeedSink, FeedSpec, CHATS_TABLE, MESSAGES_TABLE,
};
pub use model::{Chat, ChatId, ChatSource, Message, MessageId, RunStatus, SenderKind};

/// Request/response access to the remote chat store.
///
/// Every call may fail with any [`BackendError`], including timeouts; callers
/// treat all of them as recoverable.
#[async_trait]
pub trait ChatRemote: Send + Sync + 'static {
    /// Returns the ordered transcript snapshot of a chat.
    async fn fetch_messages(&self, chat: ChatId) -> Result<Vec<Message>, BackendError>;

    /// Point read of the chat's run status.
    ///
    /// Returns `Ok(None)` when the chat row or its status is absent.
    async fn fetch_status(&self, chat: ChatId) -> Result<Option<RunStatus>, BackendError>;

    /// Stores one transcript row authored by the local user.
    async fn send_message(&self, message: &Message) -> Result<(), BackendError>;

    /// Requests cancellation of the chat's current run. Aborting an already
    /// stopped run is not an error.
    async fn abort_run(&self, chat: ChatId) -> Result<(), BackendError>;

    /// Deletes every transcript row of a chat.
    async fn clear_messages(&self, chat: ChatId) -> Result<(), BackendError>;
}

/// Scoped row-change notification feeds.
///
/// Implementations must deliver events for one feed in order and must support
/// several independently filtered feeds open at the same time.
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    /// Opens a feed for `spec`; `sink` receives every matching event until the
    /// feed is unsubscribed or dropped by the transport.
    async fn subscribe(&self, spec: FeedSpec, sink: FeedSink) -> Result<FeedId, BackendError>;

    /// Closes a feed. Unknown or already closed ids are ignored.
    fn unsubscribe(&self, id: FeedId);
}

/// Read-only lookup of chat metadata kept by an external catalog.
pub trait ChatDirectory: Send + Sync {
    fn chat(&self, id: ChatId) -> Option<Chat>;

    fn chats(&self) -> Vec<Chat>;

    /// Suggested opening messages configured on the chat's source flow.
    fn sample_messages(&self, _id: ChatId) -> Vec<String> {
        Vec::new()
    }
}
