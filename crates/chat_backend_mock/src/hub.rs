use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chat_backend::{
    BackendError, FeedEvent, FeedEventKind, FeedId, FeedSink, FeedSpec, FeedTransport,
};
use serde_json::Value;
use tracing::debug;

use crate::lock_unpoisoned;

#[derive(Default)]
struct HubState {
    next_id: FeedId,
    feeds: BTreeMap<FeedId, (FeedSpec, FeedSink)>,
    opened: usize,
    closed: usize,
    subscribe_failures: VecDeque<BackendError>,
    table_failures: HashMap<String, VecDeque<BackendError>>,
}

/// In-process feed transport that fans published row changes out to every
/// open feed whose scope accepts them.
///
/// Sinks run on the publishing task, after the hub lock is released, so a sink
/// may call back into the hub.
#[derive(Default)]
pub struct MockFeedHub {
    state: Mutex<HubState>,
}

impl MockFeedHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `subscribe` call fail with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next_subscribe(&self, error: BackendError) {
        lock_unpoisoned(&self.state)
            .subscribe_failures
            .push_back(error);
    }

    /// Makes the next `subscribe` call for a feed on `table` fail with
    /// `error`; feeds on other tables still open.
    pub fn fail_next_subscribe_to(&self, table: &str, error: BackendError) {
        lock_unpoisoned(&self.state)
            .table_failures
            .entry(table.to_string())
            .or_default()
            .push_back(error);
    }

    /// Delivers an INSERT of `record` into `table`. Returns the number of
    /// feeds that received it.
    pub fn publish_insert(&self, table: &str, record: Value) -> usize {
        self.publish(table, FeedEventKind::Insert, record)
    }

    /// Delivers an UPDATE of `record` in `table`. Returns the number of feeds
    /// that received it.
    pub fn publish_update(&self, table: &str, record: Value) -> usize {
        self.publish(table, FeedEventKind::Update, record)
    }

    /// Drops every open feed, telling each sink why.
    pub fn drop_all(&self, reason: &str) {
        let dropped: Vec<FeedSink> = {
            let mut state = lock_unpoisoned(&self.state);
            let feeds = std::mem::take(&mut state.feeds);
            state.closed += feeds.len();
            feeds.into_values().map(|(_, sink)| sink).collect()
        };

        for sink in dropped {
            sink(FeedEvent::Dropped {
                reason: reason.to_string(),
            });
        }
    }

    /// Scopes of the feeds currently open, in subscription order.
    #[must_use]
    pub fn active_feeds(&self) -> Vec<FeedSpec> {
        lock_unpoisoned(&self.state)
            .feeds
            .values()
            .map(|(spec, _)| spec.clone())
            .collect()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        lock_unpoisoned(&self.state).feeds.len()
    }

    /// Total feeds ever opened.
    #[must_use]
    pub fn opened_count(&self) -> usize {
        lock_unpoisoned(&self.state).opened
    }

    /// Total feeds ever closed, by unsubscribe or drop.
    #[must_use]
    pub fn closed_count(&self) -> usize {
        lock_unpoisoned(&self.state).closed
    }

    fn publish(&self, table: &str, event: FeedEventKind, record: Value) -> usize {
        let sinks: Vec<FeedSink> = lock_unpoisoned(&self.state)
            .feeds
            .values()
            .filter(|(spec, _)| spec.accepts(table, event, &record))
            .map(|(_, sink)| sink.clone())
            .collect();

        for sink in &sinks {
            let event = match event {
                FeedEventKind::Insert => FeedEvent::Insert {
                    record: record.clone(),
                },
                FeedEventKind::Update => FeedEvent::Update {
                    record: record.clone(),
                },
            };
            sink(event);
        }

        sinks.len()
    }
}

#[async_trait]
impl FeedTransport for MockFeedHub {
    async fn subscribe(&self, spec: FeedSpec, sink: FeedSink) -> Result<FeedId, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = state.subscribe_failures.pop_front() {
            return Err(error);
        }
        if let Some(error) = state
            .table_failures
            .get_mut(&spec.table)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        state.next_id += 1;
        let id = state.next_id;
        debug!(feed = id, scope = %spec, "mock feed opened");
        state.feeds.insert(id, (spec, sink));
        state.opened += 1;
        Ok(id)
    }

    fn unsubscribe(&self, id: FeedId) {
        let mut state = lock_unpoisoned(&self.state);
        if state.feeds.remove(&id).is_some() {
            state.closed += 1;
            debug!(feed = id, "mock feed closed");
        }
    }
}
