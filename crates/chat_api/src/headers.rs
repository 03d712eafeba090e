use std::collections::BTreeMap;

use crate::config::ChatApiConfig;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_USER_AGENT: &str = "user-agent";
pub const HEADER_API_KEY: &str = "apikey";

pub const JSON_MEDIA_TYPE: &str = "application/json";
/// Asks the row store for a single object instead of an array.
pub const SINGLE_OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// Which surface a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderTarget {
    /// The chat REST API.
    Api,
    /// The row store, read one row at a time.
    StoreSingleRow,
}

/// Build a deterministic header map for one request target.
pub fn build_headers(config: &ChatApiConfig, target: HeaderTarget) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    let token = config.access_token.as_deref().and_then(non_empty);

    match target {
        HeaderTarget::Api => {
            headers.insert(HEADER_ACCEPT.to_owned(), JSON_MEDIA_TYPE.to_owned());
            if let Some(token) = token {
                headers.insert(HEADER_AUTHORIZATION.to_owned(), format!("Bearer {token}"));
            }
        }
        HeaderTarget::StoreSingleRow => {
            headers.insert(HEADER_ACCEPT.to_owned(), SINGLE_OBJECT_MEDIA_TYPE.to_owned());
            let api_key = config.store_api_key.as_deref().and_then(non_empty);
            if let Some(api_key) = api_key {
                headers.insert(HEADER_API_KEY.to_owned(), api_key.to_owned());
            }
            if let Some(bearer) = token.or(api_key) {
                headers.insert(HEADER_AUTHORIZATION.to_owned(), format!("Bearer {bearer}"));
            }
        }
    }

    headers.insert(HEADER_CONTENT_TYPE.to_owned(), JSON_MEDIA_TYPE.to_owned());

    let user_agent = config
        .user_agent
        .as_deref()
        .and_then(non_empty)
        .map(str::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), user_agent);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    headers
}

pub fn default_user_agent() -> String {
    format!(
        "agent-chat/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
