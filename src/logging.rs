//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSection;

pub const LOG_ENV: &str = "DUNGEONS_LOG";

/// Builds the filter from `DUNGEONS_LOG`, falling back to the configured level.
pub fn env_filter(logging: &LoggingSection) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&logging.level))
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init(logging: &LoggingSection) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(logging))
        .with_writer(std::io::stderr);
    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
