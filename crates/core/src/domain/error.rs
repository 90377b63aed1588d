// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Queue is not accepting members (status: {status})")]
    QueueNotAccepting { status: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    #[error("Unknown queue status '{0}'")]
    UnknownStatus(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
