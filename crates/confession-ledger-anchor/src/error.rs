//! Error types for the anchor module.

use std::time::Duration;

use thiserror::Error;

/// Errors from an external ledger.
///
/// None of these ever fail a seal; [`AnchorClient`](crate::AnchorClient)
/// logs and discards them.
#[derive(Debug, Error)]
pub enum AnchorError {
    /// The external ledger did not answer in time.
    #[error("anchor timed out after {0:?}")]
    Timeout(Duration),

    /// The external ledger could not be reached.
    #[error("anchor unreachable: {0}")]
    Unreachable(String),

    /// The external ledger refused the commitment.
    #[error("anchor rejected commitment: {0}")]
    Rejected(String),
}

/// Result type for anchor operations.
pub type Result<T> = std::result::Result<T, AnchorError>;
