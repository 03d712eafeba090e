//! Chat session reconciliation engine.
//!
//! Keeps one chat's transcript and run status consistent across three
//! sources: a bulk snapshot fetched on selection, live row feeds scoped to
//! the chat, and the user's optimistic sends.
//!
//! # Public API Overview
//! - [`SessionController`] owns the active chat, loads it, and runs the user
//!   actions (`send`, `abort`, `clear_transcript`).
//! - [`MessageStore`] and [`RunStatusTracker`] hold per-chat state.
//! - [`SubscriptionManager`] opens and releases the two feeds of a chat.
//! - [`SessionHost`] receives notifications and render requests.
//!
//! Remote collaborators are the `chat_backend` traits; `chat_backend_mock`
//! and `chat_backend_http` provide implementations.
//!
//! Invariant: a result tagged with a superseded [`RequestToken`] is never
//! applied to the stores.

pub mod config;
pub mod logging;
pub mod runtime;
pub mod store;

pub use crate::config::EnvConfig;
pub use crate::runtime::notify::{
    Notification, NotificationKind, NotificationQueue, SessionHost, Severity, WriteOp,
};
pub use crate::runtime::session::{
    LoadOutcome, Pending, RequestToken, SessionConfig, SessionController, SessionPhase,
    SessionView, WriteOutcome, DEFAULT_USER_IDENTITY,
};
pub use crate::runtime::subscriptions::{
    decode_event, FeedKind, FeedLease, FeedRouter, FeedSet, FeedUpdate, SubscriptionManager,
};
pub use crate::store::{MessageStore, RunStatusTracker, StatusSource};
