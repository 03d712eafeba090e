use std::collections::BTreeMap;
use std::time::Duration;

use crate::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};
use crate::url::DEFAULT_BASE_URL;

/// Transport configuration for chat API and row-store requests.
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    /// Base URL of the chat API; endpoint paths are appended to it.
    pub base_url: String,
    /// Optional user bearer token passed to `Authorization`.
    pub access_token: Option<String>,
    /// Base URL of the row store serving the status read.
    pub store_url: Option<String>,
    /// Row-store key sent as the `apikey` header.
    pub store_api_key: Option<String>,
    /// Optional per-request timeout.
    pub timeout: Option<Duration>,
    /// Retries after the first attempt for idempotent requests.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub retry_base_delay: Duration,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            store_url: None,
            store_api_key: None,
            timeout: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_BASE_DELAY,
            user_agent: None,
            extra_headers: BTreeMap::new(),
        }
    }
}

impl ChatApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_store(mut self, store_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.store_url = Some(store_url.into());
        self.store_api_key = Some(api_key.into());
        self
    }

    pub fn with_store_url(mut self, store_url: impl Into<String>) -> Self {
        self.store_url = Some(store_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }
}
