use compliance_infra::InfraError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ComplianceError {
    #[error("Sanctions list not loaded: {0}")]
    ListNotLoaded(String),

    #[error("Invalid screening input: {0}")]
    InvalidInput(String),

    #[error("Sanctions source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Sanctions source timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sanctions source rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("Invalid sanctions payload: {0}")]
    InvalidPayload(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ComplianceError {
    /// Upstream could not answer; callers degrade instead of failing
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ComplianceError::ListNotLoaded(_)
                | ComplianceError::SourceUnavailable(_)
                | ComplianceError::Timeout(_)
                | ComplianceError::RateLimited(_)
                | ComplianceError::InvalidPayload(_)
        )
    }
}

impl From<InfraError> for ComplianceError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::RateLimited { retry_after, .. } => ComplianceError::RateLimited(retry_after),
            InfraError::InvalidConfig(msg) => ComplianceError::ConfigError(msg),
            InfraError::Backend(msg) => ComplianceError::SourceUnavailable(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ComplianceError>;
