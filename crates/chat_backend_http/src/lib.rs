//! HTTP-backed implementation of the shared `chat_backend` contract.
//!
//! [`HttpChatRemote`] translates `chat_api` requests and errors into
//! [`ChatRemote`] semantics; [`PollingFeedTransport`] emulates scoped row
//! feeds by polling the same endpoints.

mod poll;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_api::{ChatApiClient, ChatApiConfig, ChatApiError};
use chat_backend::{BackendError, ChatId, ChatRemote, Message, RunStatus};

pub use poll::PollingFeedTransport;

/// Stable backend identifier used by client startup selection.
pub const HTTP_BACKEND_ID: &str = "http";

/// Default delay between two polls of one feed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Runtime configuration for the HTTP backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub store_url: Option<String>,
    pub store_api_key: Option<String>,
    pub access_token: Option<String>,
    pub timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl HttpBackendConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            store_url: None,
            store_api_key: None,
            access_token: None,
            timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_store(mut self, store_url: impl Into<String>, api_key: Option<String>) -> Self {
        self.store_url = Some(store_url.into());
        self.store_api_key = api_key;
        self
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Transport settings for a standalone `chat_api` client, e.g. for chat listing.
    #[must_use]
    pub fn into_chat_api_config(self) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(self.base_url);

        if let Some(store_url) = self.store_url {
            config = config.with_store_url(store_url);
        }
        config.store_api_key = self.store_api_key;

        if let Some(token) = self.access_token {
            config = config.with_access_token(token);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

/// Request surface shared by the remote adapter and the polling feeds.
#[async_trait]
trait ChatTransport: Send + Sync + 'static {
    async fn fetch_messages(&self, chat: ChatId) -> Result<Vec<Message>, ChatApiError>;
    async fn fetch_status(&self, chat: ChatId) -> Result<Option<RunStatus>, ChatApiError>;
    async fn send_message(&self, message: &Message) -> Result<(), ChatApiError>;
    async fn abort_run(&self, chat: ChatId) -> Result<(), ChatApiError>;
    async fn clear_messages(&self, chat: ChatId) -> Result<(), ChatApiError>;
}

#[async_trait]
impl ChatTransport for ChatApiClient {
    async fn fetch_messages(&self, chat: ChatId) -> Result<Vec<Message>, ChatApiError> {
        ChatApiClient::fetch_messages(self, chat).await
    }

    async fn fetch_status(&self, chat: ChatId) -> Result<Option<RunStatus>, ChatApiError> {
        ChatApiClient::fetch_status(self, chat).await
    }

    async fn send_message(&self, message: &Message) -> Result<(), ChatApiError> {
        ChatApiClient::send_message(self, message).await
    }

    async fn abort_run(&self, chat: ChatId) -> Result<(), ChatApiError> {
        ChatApiClient::abort_run(self, chat).await
    }

    async fn clear_messages(&self, chat: ChatId) -> Result<(), ChatApiError> {
        ChatApiClient::clear_messages(self, chat).await
    }
}

/// HTTP collaborators built from one configuration and sharing one client.
pub struct HttpBackend {
    pub remote: Arc<HttpChatRemote>,
    pub feeds: Arc<PollingFeedTransport>,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let poll_interval = config.poll_interval;
        let client = ChatApiClient::new(config.into_chat_api_config()).map_err(map_init_error)?;
        let transport: Arc<dyn ChatTransport> = Arc::new(client);

        Ok(Self {
            remote: Arc::new(HttpChatRemote {
                transport: Arc::clone(&transport),
            }),
            feeds: Arc::new(PollingFeedTransport::new(transport, poll_interval)),
        })
    }
}

/// `ChatRemote` adapter backed by `chat_api` transport primitives.
pub struct HttpChatRemote {
    transport: Arc<dyn ChatTransport>,
}

impl HttpChatRemote {
    #[cfg(test)]
    fn with_transport_for_tests(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ChatRemote for HttpChatRemote {
    async fn fetch_messages(&self, chat: ChatId) -> Result<Vec<Message>, BackendError> {
        self.transport
            .fetch_messages(chat)
            .await
            .map_err(map_api_error)
    }

    async fn fetch_status(&self, chat: ChatId) -> Result<Option<RunStatus>, BackendError> {
        self.transport
            .fetch_status(chat)
            .await
            .map_err(map_api_error)
    }

    async fn send_message(&self, message: &Message) -> Result<(), BackendError> {
        self.transport
            .send_message(message)
            .await
            .map_err(map_api_error)
    }

    async fn abort_run(&self, chat: ChatId) -> Result<(), BackendError> {
        self.transport.abort_run(chat).await.map_err(map_api_error)
    }

    async fn clear_messages(&self, chat: ChatId) -> Result<(), BackendError> {
        self.transport
            .clear_messages(chat)
            .await
            .map_err(map_api_error)
    }
}

fn map_api_error(error: ChatApiError) -> BackendError {
    match error {
        error if error.is_timeout() => BackendError::timeout(error.to_string()),
        ChatApiError::Status {
            status, message, ..
        } => BackendError::status(status.as_u16(), message),
        ChatApiError::Serde(error) => BackendError::decode("response body", error),
        error @ (ChatApiError::Request(_) | ChatApiError::RetryExhausted { .. }) => {
            BackendError::transport(error.to_string())
        }
        error @ (ChatApiError::InvalidBaseUrl(_)
        | ChatApiError::InvalidHeader(_)
        | ChatApiError::MissingStoreUrl) => BackendError::NotConfigured(error.to_string()),
    }
}

fn map_init_error(error: ChatApiError) -> BackendError {
    BackendError::NotConfigured(format!("failed to initialize HTTP backend: {error}"))
}
