//! Server Error Types
//!
//! Startup and listener failures. These are fatal; per-request failures are
//! [`ProxyError`](crate::proxy::ProxyError)s.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration could not be turned into a running server
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The upstream HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// Bind or accept failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
