//! Credential store errors.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open credential database: {0}")]
    Open(String),

    #[error("credential store transaction failed: {0}")]
    Transaction(String),

    #[error("credential table unavailable: {0}")]
    Table(String),

    #[error("credential read failed: {0}")]
    Read(String),

    #[error("credential write failed: {0}")]
    Write(String),

    /// The stored record is not a valid credentials document.
    #[error("malformed credential record: {0}")]
    Codec(String),

    #[error("no credentials stored under {0:?}")]
    NotFound(String),
}
