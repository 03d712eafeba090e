use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chat_backend::ChatId;
use tokio::sync::Notify;

use crate::runtime::lock_unpoisoned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Remote write that a user action issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Send,
    Abort,
    Clear,
}

impl WriteOp {
    /// User-facing title for a failed write.
    #[must_use]
    pub fn failure_title(self) -> &'static str {
        match self {
            Self::Send => "Failed to send message",
            Self::Abort => "Failed to abort chat",
            Self::Clear => "Failed to clear messages",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    WriteFailure(WriteOp),
    FetchFailure,
    SubscriptionFailure,
}

/// User-visible report of a recovered failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub kind: NotificationKind,
    pub chat: ChatId,
    pub title: String,
    pub description: String,
}

impl Notification {
    #[must_use]
    pub fn write_failure(op: WriteOp, chat: ChatId, description: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind: NotificationKind::WriteFailure(op),
            chat,
            title: op.failure_title().to_string(),
            description: description.into(),
        }
    }

    #[must_use]
    pub fn fetch_failure(chat: ChatId, description: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind: NotificationKind::FetchFailure,
            chat,
            title: "Failed to load chat".to_string(),
            description: description.into(),
        }
    }

    #[must_use]
    pub fn subscription_failure(chat: ChatId, description: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind: NotificationKind::SubscriptionFailure,
            chat,
            title: "Live updates unavailable".to_string(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

/// Rendering side of a session.
///
/// Both callbacks may run on any task, including inside a feed sink, and
/// must not call back into the session synchronously.
pub trait SessionHost: Send + Sync {
    fn notify(&self, notification: Notification);

    /// Session state changed and the view should be redrawn.
    fn request_render(&self) {}
}

/// Host that buffers notifications for pull-style consumers.
#[derive(Default)]
pub struct NotificationQueue {
    pending: Mutex<VecDeque<Notification>>,
    render_requests: AtomicUsize,
    changed: Notify,
}

impl NotificationQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notification> {
        lock_unpoisoned(&self.pending).drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.pending).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render requests received so far.
    #[must_use]
    pub fn render_requests(&self) -> usize {
        self.render_requests.load(Ordering::SeqCst)
    }

    /// Resolves after the next notification or render request.
    ///
    /// A wake that happened while nobody was waiting is kept, so a change
    /// between two calls is never missed.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

impl SessionHost for NotificationQueue {
    fn notify(&self, notification: Notification) {
        lock_unpoisoned(&self.pending).push_back(notification);
        self.changed.notify_one();
    }

    fn request_render(&self) {
        self.render_requests.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_one();
    }
}

impl fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("pending", &self.len())
            .field("render_requests", &self.render_requests())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn write_failures_use_fixed_titles() {
        let chat = ChatId::new(1);

        let send = Notification::write_failure(WriteOp::Send, chat, "boom");
        assert_eq!(send.title, "Failed to send message");
        assert_eq!(send.severity, Severity::Error);
        assert_eq!(
            Notification::write_failure(WriteOp::Abort, chat, "").title,
            "Failed to abort chat"
        );
        assert_eq!(
            Notification::write_failure(WriteOp::Clear, chat, "").title,
            "Failed to clear messages"
        );
        assert_eq!(send.to_string(), "Failed to send message: boom");
    }

    #[test]
    fn queue_drains_in_arrival_order() {
        let queue = NotificationQueue::new();
        queue.notify(Notification::fetch_failure(ChatId::new(1), "first"));
        queue.notify(Notification::subscription_failure(ChatId::new(1), "second"));
        queue.request_render();

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].description, "first");
        assert_eq!(drained[1].kind, NotificationKind::SubscriptionFailure);
        assert!(queue.is_empty());
        assert_eq!(queue.render_requests(), 1);
    }

    #[tokio::test]
    async fn changed_wakes_for_updates_made_before_waiting() {
        let queue = Arc::new(NotificationQueue::new());
        queue.request_render();

        tokio::time::timeout(std::time::Duration::from_secs(1), queue.changed())
            .await
            .expect("stored wake should resolve immediately");
    }
}
