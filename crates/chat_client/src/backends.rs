use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use catalog_store::SharedCatalog;
use chat_api::ChatApiClient;
use chat_backend::{Chat, ChatId, ChatRemote, ChatSource, FeedTransport, Message, SenderKind};
use chat_backend_http::{HttpBackend, HttpBackendConfig, HTTP_BACKEND_ID};
use chat_backend_mock::{MockFeedHub, MockRemote, DEMO_REPLY_PREFIX, MOCK_BACKEND_ID};
use serde::Deserialize;

use crate::error::ClientError;

pub const DEFAULT_BACKEND_ID: &str = MOCK_BACKEND_ID;
pub const BACKEND_ENV_VAR: &str = "AGENT_CHAT_BACKEND";
pub const CONFIG_PATH_ENV_VAR: &str = "AGENT_CHAT_CONFIG_PATH";

/// Contents of the `AGENT_CHAT_CONFIG_PATH` file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub store_url: String,
    #[serde(default)]
    pub store_api_key: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub timeout_sec: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl HttpClientConfig {
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ClientError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ClientError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|message| ClientError::InvalidConfig {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("base_url must not be empty".to_string());
        }
        if self.store_url.trim().is_empty() {
            return Err("store_url must not be empty".to_string());
        }
        if self.timeout_sec == Some(0) {
            return Err("timeout_sec must be > 0".to_string());
        }
        if self.poll_interval_ms == Some(0) {
            return Err("poll_interval_ms must be > 0".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn backend_config(&self) -> HttpBackendConfig {
        let mut config = HttpBackendConfig::new(self.base_url.trim())
            .with_store(self.store_url.trim(), self.store_api_key.clone());

        if let Some(token) = self.access_token.as_deref() {
            config = config.with_access_token(token);
        }
        if let Some(timeout_sec) = self.timeout_sec {
            config = config.with_timeout(Duration::from_secs(timeout_sec));
        }
        if let Some(interval_ms) = self.poll_interval_ms {
            config = config.with_poll_interval(Duration::from_millis(interval_ms));
        }
        config
    }
}

/// Collaborators for one client process.
pub struct Backend {
    pub id: &'static str,
    pub remote: Arc<dyn ChatRemote>,
    pub feeds: Arc<dyn FeedTransport>,
    /// Sender name from the config file; the environment overrides it.
    pub user: Option<String>,
    chat_list: ChatList,
}

enum ChatList {
    Remote(ChatApiClient),
    Fixed(Vec<Chat>),
}

impl Backend {
    /// Refreshes the local catalog's chat list from the backend.
    ///
    /// Best effort: a failed listing keeps the stored catalog. Fixed demo
    /// chats only fill an empty catalog and are not written to disk.
    pub async fn sync_catalog(&self, catalog: &SharedCatalog) {
        match &self.chat_list {
            ChatList::Remote(client) => match client.list_chats().await {
                Ok(chats) => {
                    let count = chats.len();
                    let saved = catalog.with(|store| {
                        store.set_chats(chats);
                        store.save()
                    });
                    match saved {
                        Ok(()) => tracing::debug!(count, "synced chat catalog"),
                        Err(error) => tracing::warn!(%error, "failed to save chat catalog"),
                    }
                }
                Err(error) => tracing::warn!(%error, "failed to list chats; using stored catalog"),
            },
            ChatList::Fixed(chats) => catalog.with(|store| {
                if store.chats().is_empty() {
                    store.set_chats(chats.clone());
                }
            }),
        }
    }
}

pub fn backend_from_env() -> Result<Backend, ClientError> {
    let backend_id = std::env::var(BACKEND_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let config_path = std::env::var(CONFIG_PATH_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);

    backend_for_id(
        backend_id.as_deref().unwrap_or(DEFAULT_BACKEND_ID),
        config_path.as_deref(),
    )
}

pub fn backend_for_id(backend_id: &str, config_path: Option<&Path>) -> Result<Backend, ClientError> {
    match backend_id {
        MOCK_BACKEND_ID => Ok(mock_backend()),
        HTTP_BACKEND_ID => {
            let path = config_path.ok_or(ClientError::MissingConfig(CONFIG_PATH_ENV_VAR))?;
            http_backend(&HttpClientConfig::load(path)?)
        }
        unknown => Err(ClientError::UnsupportedBackend(unknown.to_string())),
    }
}

pub fn http_backend(config: &HttpClientConfig) -> Result<Backend, ClientError> {
    let backend_config = config.backend_config();
    let client = ChatApiClient::new(backend_config.clone().into_chat_api_config())?;
    let HttpBackend { remote, feeds } = HttpBackend::new(backend_config)?;

    Ok(Backend {
        id: HTTP_BACKEND_ID,
        remote,
        feeds,
        user: config.user.clone(),
        chat_list: ChatList::Remote(client),
    })
}

/// In-process backend with two demo chats and a scripted agent that echoes
/// every message.
pub fn mock_backend() -> Backend {
    let hub = Arc::new(MockFeedHub::new());
    let remote = MockRemote::new()
        .with_hub(Arc::clone(&hub))
        .with_agent_reply(DEMO_REPLY_PREFIX);

    let chats = demo_chats();
    for chat in &chats {
        remote.seed_messages(
            chat.id,
            vec![Message::new(
                format!("welcome-{}", chat.id),
                chat.id,
                SenderKind::Assistant,
                format!("Welcome to {}. Say something.", chat.name),
            )
            .with_sender("assistant")],
        );
    }

    Backend {
        id: MOCK_BACKEND_ID,
        remote: Arc::new(remote),
        feeds: hub,
        user: None,
        chat_list: ChatList::Fixed(chats),
    }
}

fn demo_chats() -> Vec<Chat> {
    [(1, "Chat for Helpdesk", 1), (2, "Chat for Release notes", 2)]
        .into_iter()
        .map(|(id, name, project)| Chat {
            id: ChatId::new(id),
            name: name.to_string(),
            source: ChatSource::Project(project),
            status: None,
            created: None,
            updated: None,
        })
        .collect()
}
