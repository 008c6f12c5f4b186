//! Error types shared by the memory store, the maximizer and the service.

use thiserror::Error;

/// Errors raised by `amem` operations.
#[derive(Debug, Error)]
pub enum AmemError {
    /// A vector did not have the width the store or model expects.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured width
        expected: usize,
        /// Width that was supplied
        actual: usize,
    },

    /// Bad configuration or call parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A covariance stayed non-positive-definite after regularization.
    #[error("numeric instability in component {component}: {reason}")]
    NumericInstability {
        /// Index of the offending mixture component
        component: usize,
        /// What went wrong
        reason: String,
    },

    #[error("memory store is empty")]
    EmptyMemory,

    #[error("model must be trained first")]
    NotTrained,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AmemError>;

impl AmemError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        AmemError::InvalidArgument(msg.into())
    }
}

/// Fail with `DimensionMismatch` unless `actual == expected`.
pub(crate) fn check_dim(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(AmemError::DimensionMismatch { expected, actual })
    }
}
