//! Line-oriented terminal client for agent chats.
//!
//! ## Backend bootstrap
//!
//! - `AGENT_CHAT_BACKEND=mock` (default) runs against an in-process store
//!   with two demo chats and an agent that echoes every message.
//! - `AGENT_CHAT_BACKEND=http` talks to the chat REST API and the row store.
//!   Set `AGENT_CHAT_CONFIG_PATH` to a JSON file with this shape:
//!
//! ```json
//! {
//!   "base_url": "http://localhost:2855",
//!   "store_url": "http://localhost:54321",
//!   "store_api_key": "<anon key>",
//!   "access_token": "<bearer token>",
//!   "user": "dana",
//!   "timeout_sec": 30,
//!   "poll_interval_ms": 1000
//! }
//! ```
//!
//! `base_url` and `store_url` are required; unknown fields are rejected.
//!
//! The chat list is cached in `<AGENT_CHAT_HOME or cwd>/.agent-chat/catalog.json`
//! and refreshed from the backend at startup. `AGENT_CHAT_LOG` takes a tracing
//! filter directive; logs go to stderr.

pub mod app;
pub mod backends;
pub mod commands;
pub mod error;

pub use error::ClientError;
