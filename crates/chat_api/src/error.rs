use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Row-store error code for "the single-row read matched no rows".
pub const NO_ROWS_CODE: &str = "PGRST116";

#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("row store URL is not configured")]
    MissingStoreUrl,

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status {
        status: StatusCode,
        message: String,
        code: Option<String>,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("retry exhausted after max attempts (status: {}, last_error: {last_error:?})", display_status(.status))]
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
}

impl ChatApiError {
    /// True when the failure was a client-side request timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Request(error) => error.is_timeout(),
            Self::Status { status, .. } => *status == StatusCode::REQUEST_TIMEOUT,
            _ => false,
        }
    }

    /// True for the row store's "no rows" answer to a single-row read.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::Status { code: Some(code), .. } if code == NO_ROWS_CODE)
    }
}

fn display_status(status: &Option<StatusCode>) -> String {
    status
        .as_ref()
        .map(|status| status.as_u16().to_string())
        .unwrap_or_else(|| "n/a".to_owned())
}

/// Extracts a human readable message from an error response body.
///
/// Understands `{"error": "..."}`, `{"error": {"message": "..."}}`,
/// `{"message": "..."}` and `{"detail": "..."}`; anything else falls back to
/// the raw body or the status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let explicit = parsed.as_ref().and_then(|value| {
        [
            value.get("error").and_then(Value::as_str),
            value.pointer("/error/message").and_then(Value::as_str),
            value.get("message").and_then(Value::as_str),
            value.get("detail").and_then(Value::as_str),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|message| !message.is_empty())
    });

    if let Some(message) = explicit {
        return message.to_string();
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

/// Extracts the machine readable `code` of an error body, if any.
pub fn parse_error_code(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    let code = value
        .get("code")
        .or_else(|| value.pointer("/error/code"))?;
    match code {
        Value::String(code) if !code.trim().is_empty() => Some(code.trim().to_string()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}
