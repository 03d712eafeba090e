use std::sync::{Mutex, MutexGuard};

use chat_backend::{Chat, ChatDirectory, ChatId};

use crate::store::CatalogStore;

/// Thread-safe handle that lets a session look chats up in a catalog the
/// client keeps editing.
#[derive(Debug)]
pub struct SharedCatalog {
    store: Mutex<CatalogStore>,
}

impl SharedCatalog {
    #[must_use]
    pub fn new(store: CatalogStore) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Runs `f` with exclusive access to the underlying store.
    pub fn with<R>(&self, f: impl FnOnce(&mut CatalogStore) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, CatalogStore> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ChatDirectory for SharedCatalog {
    fn chat(&self, id: ChatId) -> Option<Chat> {
        self.lock().chat(id).cloned()
    }

    fn chats(&self) -> Vec<Chat> {
        self.lock().chats().to_vec()
    }

    fn sample_messages(&self, id: ChatId) -> Vec<String> {
        self.lock().sample_messages(id)
    }
}
