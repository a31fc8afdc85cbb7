// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Invalid batch key: {0}")]
    InvalidBatchKey(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
