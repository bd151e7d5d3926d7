//! Error types for risk engine

use compliance_infra::InfraError;
use compliance_service::ComplianceError;
use thiserror::Error;

/// Risk engine error
///
/// `NotFound` and `Invalid` are terminal and reach the caller as is.
/// `Unavailable` only escapes when no cached fallback exists.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// No company for the identifier
    #[error("Company not found: {0}")]
    NotFound(String),

    /// Malformed identifier or name
    #[error("Invalid query: {0}")]
    Invalid(String),

    /// Upstream failed and nothing to fall back on
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Registry client error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry has no such company
    #[error("Registry has no company {0}")]
    NotFound(String),

    /// Transient failure: network, timeout, rate limit, 5xx
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// The registry answered with something that does not map to a profile
    #[error("Invalid registry payload: {0}")]
    InvalidPayload(String),
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => Error::NotFound(id),
            RegistryError::Unavailable(msg) => Error::Unavailable(msg),
            RegistryError::InvalidPayload(msg) => Error::Unavailable(msg),
        }
    }
}

impl From<ComplianceError> for Error {
    fn from(err: ComplianceError) -> Self {
        match err {
            ComplianceError::InvalidInput(msg) => Error::Invalid(msg),
            ComplianceError::ConfigError(msg) => Error::InvalidConfig(msg),
            other => Error::Unavailable(other.to_string()),
        }
    }
}

impl From<InfraError> for Error {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::InvalidConfig(msg) => Error::InvalidConfig(msg),
            other => Error::Unavailable(other.to_string()),
        }
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
