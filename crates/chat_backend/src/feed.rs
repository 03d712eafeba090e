use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::model::ChatId;

/// Row-store table holding transcript rows.
pub const MESSAGES_TABLE: &str = "chat_messages";
/// Row-store table holding chat metadata and run status.
pub const CHATS_TABLE: &str = "chats";

/// Identifier for one open feed, unique per transport.
pub type FeedId = u64;

/// Row change kind a feed listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedEventKind {
    Insert,
    Update,
}

impl FeedEventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
        }
    }
}

/// Equality filter applied to changed rows (`column == value`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedFilter {
    pub column: String,
    pub value: String,
}

impl FeedFilter {
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// Returns true when `row[column]` renders to the filter value.
    ///
    /// Numbers and strings compare by their textual form so that `42` and
    /// `"42"` both satisfy `id=eq.42`.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(text)) => *text == self.value,
            Some(Value::Number(number)) => number.to_string() == self.value,
            Some(Value::Bool(flag)) => flag.to_string() == self.value,
            _ => false,
        }
    }
}

impl fmt::Display for FeedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// Scope of one notification feed: (table, event kind, filter predicate).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedSpec {
    pub table: String,
    pub event: FeedEventKind,
    pub filter: FeedFilter,
}

impl FeedSpec {
    /// Newly inserted transcript rows of one chat.
    #[must_use]
    pub fn message_inserts(chat: ChatId) -> Self {
        Self {
            table: MESSAGES_TABLE.to_string(),
            event: FeedEventKind::Insert,
            filter: FeedFilter::eq("chat_id", chat),
        }
    }

    /// Updates of one chat row (run status changes).
    #[must_use]
    pub fn status_updates(chat: ChatId) -> Self {
        Self {
            table: CHATS_TABLE.to_string(),
            event: FeedEventKind::Update,
            filter: FeedFilter::eq("id", chat),
        }
    }

    #[must_use]
    pub fn accepts(&self, table: &str, event: FeedEventKind, row: &Value) -> bool {
        self.table == table && self.event == event && self.filter.matches(row)
    }
}

impl fmt::Display for FeedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.table, self.event.as_str(), self.filter)
    }
}

/// One notification delivered to a feed sink.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A row matching the feed scope was inserted; carries the new row.
    Insert { record: Value },
    /// A row matching the feed scope was updated; carries the new row.
    Update { record: Value },
    /// The transport lost the feed. No further events follow.
    Dropped { reason: String },
}

/// Callback receiving events for one feed, invoked in transport order.
pub type FeedSink = Arc<dyn Fn(FeedEvent) + Send + Sync>;
