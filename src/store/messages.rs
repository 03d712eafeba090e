use std::collections::HashSet;

use chat_backend::{Message, MessageId};

/// Ordered, id-deduplicated transcript of one chat.
///
/// Order is the order in which the engine accepted rows, not their creation
/// timestamps. Once accepted, a row only leaves the store through
/// [`MessageStore::replace_all`] or [`MessageStore::clear`].
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    entries: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `incoming` unless a row with the same id is already present.
    ///
    /// Returns whether the store changed.
    pub fn merge(&mut self, incoming: Message) -> bool {
        if !self.ids.insert(incoming.id.clone()) {
            return false;
        }
        self.entries.push(incoming);
        true
    }

    /// Overwrites the whole sequence with a fetched snapshot.
    ///
    /// Duplicate ids inside the snapshot keep their first occurrence.
    pub fn replace_all(&mut self, snapshot: Vec<Message>) {
        self.clear();
        for message in snapshot {
            self.merge(message);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.entries
    }

    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chat_backend::{ChatId, SenderKind};
    use pretty_assertions::assert_eq;

    use super::*;

    const CHAT: ChatId = ChatId::new(42);

    fn agent(id: i64, content: &str) -> Message {
        Message::new(id, CHAT, SenderKind::Assistant, content)
    }

    fn ids(store: &MessageStore) -> Vec<String> {
        store
            .messages()
            .iter()
            .map(|message| message.id.to_string())
            .collect()
    }

    #[test]
    fn merge_keeps_one_entry_per_id_in_first_seen_order() {
        let mut store = MessageStore::new();

        assert!(store.merge(agent(3, "c")));
        assert!(store.merge(agent(1, "a")));
        assert!(!store.merge(agent(3, "c again")));
        assert!(store.merge(agent(2, "b")));
        assert!(!store.merge(agent(1, "a again")));

        assert_eq!(ids(&store), vec!["3", "1", "2"]);
        assert_eq!(store.messages()[0].content, "c");
    }

    #[test]
    fn merging_twice_matches_merging_once() {
        let mut once = MessageStore::new();
        once.merge(agent(1, "a"));

        let mut twice = MessageStore::new();
        twice.merge(agent(1, "a"));
        twice.merge(agent(1, "a"));

        assert_eq!(once.messages(), twice.messages());
    }

    #[test]
    fn replace_all_then_merge_appends_unknown_ids() {
        let mut store = MessageStore::new();
        store.merge(agent(9, "stale"));

        store.replace_all(vec![agent(1, "a"), agent(2, "b")]);
        store.merge(agent(3, "c"));
        store.merge(agent(2, "b"));

        assert_eq!(ids(&store), vec!["1", "2", "3"]);
        assert!(!store.contains(&MessageId::from(9)));
    }

    #[test]
    fn replace_all_collapses_duplicate_snapshot_rows() {
        let mut store = MessageStore::new();

        store.replace_all(vec![agent(1, "first"), agent(1, "second")]);

        assert_eq!(store.len(), 1);
        assert_eq!(store.messages()[0].content, "first");
    }

    #[test]
    fn clear_forgets_ids_so_rows_can_return() {
        let mut store = MessageStore::new();
        store.merge(agent(1, "a"));

        store.clear();
        assert!(store.is_empty());
        assert!(store.merge(agent(1, "a")));
    }

    #[test]
    fn numeric_and_textual_ids_are_the_same_row() {
        let mut store = MessageStore::new();
        store.merge(agent(5, "numeric"));

        let textual = Message::new("5", CHAT, SenderKind::Assistant, "textual");
        assert!(!store.merge(textual));
        assert_eq!(store.len(), 1);
    }
}
