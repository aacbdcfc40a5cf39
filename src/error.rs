//! Crate-wide error type.

use thiserror::Error;

use crate::value::CType;

/// The error type returned by fallible public APIs.
#[derive(Debug, Clone, Error)]
pub enum ConstellationError {
    #[error("input '{name}' has type {actual}, expected {expected}")]
    InputTypeMismatchError {
        name: String,
        expected: CType,
        actual: CType,
    },

    #[error("input '{name}' was already provided with a different value")]
    InputAlreadyProvidedError { name: String },

    #[error("node '{name}' has type {actual}, expected {expected}")]
    NodeTypeMismatchError {
        name: String,
        expected: CType,
        actual: CType,
    },

    #[error("node '{name}' was already resolved")]
    NodeAlreadyResolvedError { name: String },

    #[error("unknown node '{name}'")]
    UnknownNodeError { name: String },

    #[error("{0}")]
    StreamingError(String),

    #[error("module '{module_name}' ({module_id}) failed: {message}")]
    ModuleExecutionError {
        module_name: String,
        module_id: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("not found: {0}")]
    NotFoundError(String),

    #[error("invalid construction: {0}")]
    DomainError(String),
}

impl From<crate::json::streaming::StreamingError> for ConstellationError {
    fn from(e: crate::json::streaming::StreamingError) -> Self {
        ConstellationError::StreamingError(e.to_string())
    }
}

impl From<figment::Error> for ConstellationError {
    fn from(e: figment::Error) -> Self {
        ConstellationError::ConfigurationError(e.to_string())
    }
}
