//! Error types for the estimation engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for estimation operations
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// The persistence collaborator could not be read
    #[error("Corpus unavailable: {0}")]
    CorpusUnavailable(String),

    /// No estimation provider is configured or reachable
    #[error("Estimation provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider answered but the payload is not a valid estimate
    #[error("Provider error: {0}")]
    Provider(String),

    /// The call was canceled or exceeded its deadline
    #[error("Context canceled: {0}")]
    ContextCanceled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller input that cannot be processed, such as an empty batch
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Config source error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for estimation operations
pub type Result<T> = std::result::Result<T, EstimatorError>;

/// Failure category recorded for a task in batch mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CorpusUnavailable,
    ProviderUnavailable,
    ProviderError,
    ContextCanceled,
    Internal,
}

/// Serializable record of why a task failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&EstimatorError> for TaskFailure {
    fn from(err: &EstimatorError) -> Self {
        let kind = match err {
            EstimatorError::CorpusUnavailable(_) => FailureKind::CorpusUnavailable,
            EstimatorError::ProviderUnavailable(_) => FailureKind::ProviderUnavailable,
            EstimatorError::Provider(_) => FailureKind::ProviderError,
            EstimatorError::ContextCanceled(_) => FailureKind::ContextCanceled,
            _ => FailureKind::Internal,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
