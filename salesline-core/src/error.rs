use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("pipeline {0} not found")]
    NotFound(Uuid),

    /// The pipeline changed since the caller read it. Safe to retry after re-reading.
    #[error("pipeline {id} was modified concurrently (expected revision {expected})")]
    Conflict { id: Uuid, expected: i64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Stored data that cannot be decoded. Never coerced into a default.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("could not resolve a data directory for the default database")]
    NoDataDir,

    #[error("failed to create data directory: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
