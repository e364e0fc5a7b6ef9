use thiserror::Error;

use super::IssueId;
use crate::kernel::{Retryable, StoreError};

/// Errors surfaced by engagement operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing or invalid input; `field` names the offending field.
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Issue not found: {0}")]
    NotFound(IssueId),

    /// Concurrent writers kept winning the race for the same record.
    #[error("Concurrent update conflict during {0}, please retry")]
    Conflict(&'static str),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

impl EngineError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            message: message.into(),
        }
    }
}

impl Retryable for EngineError {
    fn is_transient(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable(e) if e.is_transient())
    }

    fn exhausted(operation: &'static str) -> Self {
        EngineError::Conflict(operation)
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
