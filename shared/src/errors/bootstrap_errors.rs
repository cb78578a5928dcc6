use thiserror::Error;

use super::ConfigError;

/// Failures that can occur while bringing the engine up. Everything past
/// bootstrap is infallible by construction (see `BootstrapError`'s doc on
/// `heappulse::bootstrap::init`): a hook that fires before or after a failed
/// bootstrap is simply a no-op.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open log sink at `{path}`: {source}")]
    LogSink {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to install the access-protection signal handler: {0}")]
    SignalHandler(String),

    #[error("bootstrap already completed")]
    AlreadyInitialized,
}
