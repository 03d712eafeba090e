//! Deterministic in-memory implementation of the shared `chat_backend`
//! contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing of the session engine.

mod hub;
mod remote;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chat_backend::{Chat, ChatDirectory, ChatId};

pub use hub::MockFeedHub;
pub use remote::{MockOp, MockRemote};

/// Stable backend identifier used for explicit startup selection.
pub const MOCK_BACKEND_ID: &str = "mock";

/// Reply prefix used by the demo backend's scripted agent.
pub const DEMO_REPLY_PREFIX: &str = "echo: ";

/// Fixed chat catalog for mock sessions.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    chats: Vec<Chat>,
    samples: HashMap<ChatId, Vec<String>>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new(chats: Vec<Chat>) -> Self {
        Self {
            chats,
            samples: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_samples(mut self, chat: ChatId, samples: Vec<String>) -> Self {
        self.samples.insert(chat, samples);
        self
    }
}

impl ChatDirectory for StaticDirectory {
    fn chat(&self, id: ChatId) -> Option<Chat> {
        self.chats.iter().find(|chat| chat.id == id).cloned()
    }

    fn chats(&self) -> Vec<Chat> {
        self.chats.clone()
    }

    fn sample_messages(&self, id: ChatId) -> Vec<String> {
        self.samples.get(&id).cloned().unwrap_or_default()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
