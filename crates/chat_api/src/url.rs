use chat_backend::{ChatId, CHATS_TABLE};
use url::Url;

use crate::error::ChatApiError;

/// Default base URL for the chat API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:2855";

/// Parse and normalize a base URL.
///
/// Normalization rules:
/// 1) an empty input falls back to [`DEFAULT_BASE_URL`]
/// 2) only `http` and `https` are accepted
/// 3) query and fragment are dropped; a trailing `/` is insignificant
pub fn normalize_base_url(input: &str) -> Result<Url, ChatApiError> {
    let base = match input.trim() {
        "" => DEFAULT_BASE_URL,
        trimmed => trimmed,
    };

    let mut url =
        Url::parse(base).map_err(|error| ChatApiError::InvalidBaseUrl(format!("{base}: {error}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ChatApiError::InvalidBaseUrl(format!(
            "{base}: expected an http(s) URL"
        )));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// `{base}/api/chats`
pub fn chats_url(base: &Url) -> Url {
    with_segments(base, &["api", "chats"])
}

/// `{base}/api/chats/{id}`
pub fn chat_url(base: &Url, chat: ChatId) -> Url {
    with_segments(base, &["api", "chats", &chat.to_string()])
}

/// `{base}/api/chats/{id}/messages`
pub fn messages_url(base: &Url, chat: ChatId) -> Url {
    with_segments(base, &["api", "chats", &chat.to_string(), "messages"])
}

/// `{base}/api/chats/{id}/abort`
pub fn abort_url(base: &Url, chat: ChatId) -> Url {
    with_segments(base, &["api", "chats", &chat.to_string(), "abort"])
}

/// `{store}/rest/v1/chats?select=status&id=eq.{id}`
pub fn status_url(store: &Url, chat: ChatId) -> Url {
    let mut url = with_segments(store, &["rest", "v1", CHATS_TABLE]);
    url.query_pairs_mut()
        .append_pair("select", "status")
        .append_pair("id", &format!("eq.{chat}"));
    url
}

fn with_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
