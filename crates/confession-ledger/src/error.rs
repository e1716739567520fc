//! Error types for the ledger.

use confession_ledger_anchor::AnchorError;
use confession_ledger_core::ValidationError;
use confession_ledger_store::StoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
///
/// Admission rejections are not errors; they come back as
/// [`Admission::Rejected`](crate::Admission::Rejected).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Validation error (also returned by chain verification).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// External ledger error, only surfaced by explicit reads.
    #[error("anchor error: {0}")]
    Anchor(#[from] AnchorError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Submission not found.
    #[error("submission not found: {0}")]
    SubmissionNotFound(String),

    /// Block not found.
    #[error("block not found: {0}")]
    BlockNotFound(u64),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field that must be non-zero is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("duplicate category: {0}")]
    DuplicateCategory(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
