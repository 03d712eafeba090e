use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use chat_backend::{Chat, ChatId, ChatSource, Message, RunStatus};

use crate::config::ChatApiConfig;
use crate::error::{parse_error_code, parse_error_message, ChatApiError};
use crate::headers::{build_headers, HeaderTarget};
use crate::retry::{is_retryable_http_error, retry_delay};
use crate::url::{abort_url, chat_url, chats_url, messages_url, normalize_base_url, status_url};

/// Whether a request may be repeated after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Safe to repeat: reads, deletes, and abort requests.
    Idempotent,
    /// Sent exactly once: message sends and chat creation.
    Once,
}

/// Body of `POST /api/chats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewChat {
    pub name: String,
    #[serde(flatten)]
    pub source: ChatSource,
}

/// Body of `POST /api/chats/{id}`; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
}

#[derive(Debug, Deserialize)]
struct StatusRow {
    #[serde(default)]
    status: Option<RunStatus>,
}

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
    base_url: Url,
    store_url: Option<Url>,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let base_url = normalize_base_url(&config.base_url)?;
        let store_url = match config.store_url.as_deref().map(str::trim) {
            Some(store) if !store.is_empty() => Some(normalize_base_url(store)?),
            _ => None,
        };

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;

        Ok(Self {
            http,
            config,
            base_url,
            store_url,
        })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn has_store(&self) -> bool {
        self.store_url.is_some()
    }

    pub fn build_headers(&self, target: HeaderTarget) -> Result<HeaderMap, ChatApiError> {
        let mut out = HeaderMap::new();
        for (key, value) in build_headers(&self.config, target) {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, ChatApiError> {
        Ok(self
            .http
            .request(method, url)
            .headers(self.build_headers(HeaderTarget::Api)?))
    }

    pub fn list_messages_request(&self, chat: ChatId) -> Result<RequestBuilder, ChatApiError> {
        self.request(Method::GET, messages_url(&self.base_url, chat))
    }

    pub fn send_message_request(&self, message: &Message) -> Result<RequestBuilder, ChatApiError> {
        Ok(self
            .request(Method::POST, messages_url(&self.base_url, message.chat_id))?
            .json(message))
    }

    pub fn clear_messages_request(&self, chat: ChatId) -> Result<RequestBuilder, ChatApiError> {
        self.request(Method::DELETE, messages_url(&self.base_url, chat))
    }

    pub fn abort_request(&self, chat: ChatId) -> Result<RequestBuilder, ChatApiError> {
        self.request(Method::POST, abort_url(&self.base_url, chat))
    }

    pub fn status_request(&self, chat: ChatId) -> Result<RequestBuilder, ChatApiError> {
        let store = self.store_url.as_ref().ok_or(ChatApiError::MissingStoreUrl)?;
        Ok(self
            .http
            .get(status_url(store, chat))
            .headers(self.build_headers(HeaderTarget::StoreSingleRow)?))
    }

    pub fn list_chats_request(&self) -> Result<RequestBuilder, ChatApiError> {
        self.request(Method::GET, chats_url(&self.base_url))
    }

    pub fn create_chat_request(&self, chat: &NewChat) -> Result<RequestBuilder, ChatApiError> {
        Ok(self
            .request(Method::POST, chats_url(&self.base_url))?
            .json(chat))
    }

    pub fn update_chat_request(
        &self,
        chat: ChatId,
        update: &ChatUpdate,
    ) -> Result<RequestBuilder, ChatApiError> {
        Ok(self
            .request(Method::POST, chat_url(&self.base_url, chat))?
            .json(update))
    }

    pub fn delete_chat_request(&self, chat: ChatId) -> Result<RequestBuilder, ChatApiError> {
        self.request(Method::DELETE, chat_url(&self.base_url, chat))
    }

    pub async fn fetch_messages(&self, chat: ChatId) -> Result<Vec<Message>, ChatApiError> {
        let response = self
            .execute(RetryPolicy::Idempotent, || self.list_messages_request(chat))
            .await?;
        decode_json(response).await
    }

    pub async fn send_message(&self, message: &Message) -> Result<(), ChatApiError> {
        self.execute(RetryPolicy::Once, || self.send_message_request(message))
            .await?;
        Ok(())
    }

    pub async fn clear_messages(&self, chat: ChatId) -> Result<(), ChatApiError> {
        self.execute(RetryPolicy::Idempotent, || self.clear_messages_request(chat))
            .await?;
        Ok(())
    }

    pub async fn abort_run(&self, chat: ChatId) -> Result<(), ChatApiError> {
        self.execute(RetryPolicy::Idempotent, || self.abort_request(chat))
            .await?;
        Ok(())
    }

    /// Point read of a chat's run status from the row store.
    ///
    /// A missing row or a null status column yields `Ok(None)`.
    pub async fn fetch_status(&self, chat: ChatId) -> Result<Option<RunStatus>, ChatApiError> {
        match self
            .execute(RetryPolicy::Idempotent, || self.status_request(chat))
            .await
        {
            Ok(response) => Ok(decode_json::<StatusRow>(response).await?.status),
            Err(error) if error.is_no_rows() => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>, ChatApiError> {
        let response = self
            .execute(RetryPolicy::Idempotent, || self.list_chats_request())
            .await?;
        decode_json(response).await
    }

    pub async fn create_chat(&self, chat: &NewChat) -> Result<Chat, ChatApiError> {
        let response = self
            .execute(RetryPolicy::Once, || self.create_chat_request(chat))
            .await?;
        decode_json(response).await
    }

    pub async fn update_chat(&self, chat: ChatId, update: &ChatUpdate) -> Result<(), ChatApiError> {
        self.execute(RetryPolicy::Idempotent, || {
            self.update_chat_request(chat, update)
        })
        .await?;
        Ok(())
    }

    pub async fn delete_chat(&self, chat: ChatId) -> Result<(), ChatApiError> {
        self.execute(RetryPolicy::Idempotent, || self.delete_chat_request(chat))
            .await?;
        Ok(())
    }

    /// Sends the request produced by `build`, retrying transient failures
    /// when `policy` allows it.
    pub async fn execute<F>(&self, policy: RetryPolicy, build: F) -> Result<Response, ChatApiError>
    where
        F: Fn() -> Result<RequestBuilder, ChatApiError>,
    {
        let max_retries = match policy {
            RetryPolicy::Idempotent => self.config.max_retries,
            RetryPolicy::Once => 0,
        };
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match build()?.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let body = response.text().await.unwrap_or_default();
                    let message = parse_error_message(status, &body);
                    if attempt < max_retries && is_retryable_http_error(status.as_u16(), &body) {
                        debug!(%status, attempt, "retrying chat API request");
                        last_status = Some(status);
                        last_error = Some(message);
                        tokio::time::sleep(retry_delay(self.config.retry_base_delay, attempt))
                            .await;
                        continue;
                    }

                    return Err(ChatApiError::Status {
                        status,
                        message,
                        code: parse_error_code(&body),
                    });
                }
                Err(error) => {
                    if max_retries == 0 {
                        return Err(ChatApiError::Request(error));
                    }
                    debug!(%error, attempt, "chat API request failed");
                    last_error = Some(error.to_string());
                    if attempt < max_retries {
                        tokio::time::sleep(retry_delay(self.config.retry_base_delay, attempt))
                            .await;
                        continue;
                    }
                }
            }
        }

        Err(ChatApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ChatApiError> {
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}
