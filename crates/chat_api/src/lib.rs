//! Transport-only HTTP client for the chat REST surface.
//!
//! This crate owns request building, retries, and response decoding for the
//! chat API (`/api/chats/...`) and the row-store status read. It contains no
//! session state and no push/feed logic; adapters in other crates map its
//! errors into the shared backend contract.

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod retry;
pub mod url;

pub use client::{ChatApiClient, ChatUpdate, NewChat, RetryPolicy};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use reqwest::StatusCode;
pub use url::normalize_base_url;
