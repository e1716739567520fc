//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The seal transaction lost a race or found already-sealed submissions.
    ///
    /// Nothing was written.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A block or submission the operation needs does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
