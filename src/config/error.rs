//! Configuration validation errors

use thiserror::Error;

/// Lowest accepted worker count
pub const MIN_CONCURRENCY: usize = 1;

/// Highest accepted worker count
pub const MAX_CONCURRENCY: usize = 20;

/// Reasons a resolved configuration is rejected before anything runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(
        "API token is required, provide it via --token, the JOPLIN_TOKEN environment variable or the config file"
    )]
    MissingToken,

    #[error("host is required")]
    MissingHost,

    #[error("port must be between 1 and 65535")]
    InvalidPort,

    #[error("timeout must be positive")]
    InvalidTimeout,

    #[error(
        "concurrency must be between {min} and {max}, got {value}",
        min = MIN_CONCURRENCY,
        max = MAX_CONCURRENCY
    )]
    InvalidConcurrency { value: usize },

    #[error("retry attempts must be at least 1")]
    InvalidRetryAttempts,
}
