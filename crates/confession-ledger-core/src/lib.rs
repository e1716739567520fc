//! # Confession Ledger Core
//!
//! Pure primitives for the confession ledger: identities, submissions,
//! blocks, and Merkle commitments.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Identity`] - A 20-byte address recovered from a signature
//! - [`Submission`] - Signed content, pending or sealed
//! - [`SubmissionId`] - Content-addressed identifier (Blake3 hash)
//! - [`Block`] - A numbered, hash-chained batch of submissions
//! - [`MerkleTree`] - Commitment over a block's ordered leaves
//!
//! ## Hashing
//!
//! Submission ids use Blake3; every ledger hash (leaf, pair, block) is
//! Keccak-256 over deterministic CBOR. See the [`canonical`] module.

pub mod block;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod submission;
pub mod types;
pub mod validation;
pub mod verifier;

pub use block::{compute_block_hash, AnchorRef, Block, BlockCommitment, ChainHead, SealedBlock};
pub use crypto::{Identity, KeccakHash, Keypair, RecoverableSignature};
pub use error::{CoreError, ValidationError};
pub use merkle::{
    compute_root, generate_proof, hash_pair, leaf_hash, verify_proof, MerkleProof, MerkleTree,
    ZERO_HASH,
};
pub use submission::{Submission, SubmissionRequest};
pub use types::{now_millis, SubmissionId};
pub use validation::{validate_content, verify_block, verify_link};
pub use verifier::SignatureVerifier;
