//! Diagnostic logging setup.
//!
//! Library code only emits `tracing` events; binaries install a subscriber
//! once through [`init_tracing`].

use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "AGENT_CHAT_LOG";
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Builds the filter for `directive`, falling back to [`DEFAULT_LOG_FILTER`]
/// when it is missing or does not parse.
#[must_use]
pub fn env_filter(directive: Option<&str>) -> EnvFilter {
    let directive = directive
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .unwrap_or(DEFAULT_LOG_FILTER);
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs a stderr `fmt` subscriber. Returns false when a global
/// subscriber was already set.
pub fn init_tracing(directive: Option<&str>) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(directive))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
