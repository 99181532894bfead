use std::error::Error;
use thiserror::Error;

use crate::state::round::RoundId;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The round does not exist in the store.
    #[error("round `{id}` not found in storage")]
    NotFound { id: RoundId },
    /// The round was saved by someone else since it was read.
    #[error("round `{id}` version conflict (expected {expected}, found {actual})")]
    VersionConflict {
        id: RoundId,
        expected: u64,
        actual: u64,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
