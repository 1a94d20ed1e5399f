// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid consumer loop state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid endpoint for queue '{queue}': {reason}")]
    InvalidEndpoint { queue: String, reason: String },

    #[error("Queue '{0}' is mapped more than once")]
    DuplicateQueue(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
