//! Per-chat state owned by the session: transcript rows and run status.

mod messages;
mod status;

pub use messages::MessageStore;
pub use status::{RunStatusTracker, StatusSource};
