use chrono::{DateTime, Utc};
use thiserror::Error;

use requesty_core::ports::StorageError;

pub mod memory;
pub mod queue;
pub mod request;

pub use memory::{InMemoryQueueRepository, InMemoryRequestRepository};
pub use queue::SqlQueueRepository;
pub use request::SqlRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

impl From<RepositoryError> for StorageError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => StorageError::Backend(error.to_string()),
            RepositoryError::Decode(message) | RepositoryError::Encode(message) => {
                StorageError::Corrupt(message)
            }
        }
    }
}

pub(crate) fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}`: {error}")))
}
