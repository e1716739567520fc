//! Error types for the confession ledger core.

use thiserror::Error;

use crate::crypto::KeccakHash;

/// Core errors raised while parsing or encoding ledger primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for submission shape and block consistency.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content is empty")]
    EmptyContent,

    #[error("content is {len} characters, maximum is {max}")]
    ContentTooLong { len: usize, max: usize },

    #[error("unknown category: {0}")]
    InvalidCategory(String),

    #[error("block {number}: submission count {declared} does not match {actual} sealed submissions")]
    CountMismatch {
        number: u64,
        declared: u64,
        actual: u64,
    },

    #[error("block {number}: merkle root mismatch: expected {expected}, computed {computed}")]
    MerkleRootMismatch {
        number: u64,
        expected: KeccakHash,
        computed: KeccakHash,
    },

    #[error("block {number}: integrity hash mismatch: expected {expected}, computed {computed}")]
    BlockHashMismatch {
        number: u64,
        expected: KeccakHash,
        computed: KeccakHash,
    },

    #[error("block {number}: prev_hash {got} does not link to {expected}")]
    BrokenLink {
        number: u64,
        expected: KeccakHash,
        got: KeccakHash,
    },

    #[error("block numbering gap: expected {expected}, got {got}")]
    NumberGap { expected: u64, got: u64 },

    #[error("submission {submission} in block {number} carries block_ref {block_ref:?}")]
    WrongBlockRef {
        number: u64,
        submission: String,
        block_ref: Option<u64>,
    },
}
