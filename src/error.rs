//! Error types for sidra-fetch
//!
//! One crate-wide [`Error`] enum covers every failure class the pipeline can hit:
//! - transport and HTTP status failures (retried by [`crate::retry`])
//! - empty response bodies (treated like transport failures)
//! - filesystem and serialization failures
//! - configuration and metadata problems

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sidra-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sidra-fetch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers.count")
        key: Option<String>,
    },

    /// Transport-level failure (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered with a non-success status code
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Status code returned by the service
        status: u16,
        /// Requested URL
        url: String,
    },

    /// The service answered successfully but sent no bytes
    #[error("empty response body for {url}")]
    EmptyBody {
        /// Requested URL
        url: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write a fetched payload to its destination
    #[error("failed to write {path}: {source}")]
    Write {
        /// Destination that could not be written
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metadata present but unusable (missing fields, bad dates, ...)
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// A cached file or entity the caller expected was not there
    #[error("not found: {0}")]
    NotFound(String),

    /// The worker pool was stopped and no longer accepts tasks
    #[error("worker pool is shutting down: not accepting new tasks")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
