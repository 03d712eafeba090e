//! Environment configuration.

use std::env;
use std::path::PathBuf;

use crate::logging::LOG_ENV;
use crate::runtime::session::SessionConfig;

pub const USER_ENV: &str = "AGENT_CHAT_USER";
pub const SUBSCRIBE_DURING_LOAD_ENV: &str = "AGENT_CHAT_SUBSCRIBE_DURING_LOAD";
pub const HOME_ENV: &str = "AGENT_CHAT_HOME";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Sender name for the user's own messages.
    pub user: Option<String>,
    pub subscribe_during_load: bool,
    pub log_filter: Option<String>,
    /// Directory whose `.agent-chat/` holds the local catalog.
    pub home: Option<PathBuf>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            user: env_string_opt(USER_ENV),
            subscribe_during_load: env_flag(SUBSCRIBE_DURING_LOAD_ENV),
            log_filter: env_string_opt(LOG_ENV),
            home: env_string_opt(HOME_ENV).map(PathBuf::from),
        }
    }

    /// Session settings with the environment's overrides applied.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let config = SessionConfig::default().with_subscribe_during_load(self.subscribe_during_load);
        match &self.user {
            Some(user) => config.with_user_identity(user.clone()),
            None => config,
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
