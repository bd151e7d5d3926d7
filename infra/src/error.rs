//! Error types for shared infrastructure

use std::time::Duration;
use thiserror::Error;

/// Infrastructure error
#[derive(Debug, Error, Clone)]
pub enum InfraError {
    /// No token became available within the caller's wait budget
    #[error("Rate limit exceeded for {key}: retry after {retry_after:?}")]
    RateLimited {
        /// Bucket key (provider, optionally sub-keyed by caller)
        key: String,
        /// Time until the next token
        retry_after: Duration,
    },

    /// Cache backend failure
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<redis::RedisError> for InfraError {
    fn from(err: redis::RedisError) -> Self {
        InfraError::Backend(err.to_string())
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, InfraError>;
