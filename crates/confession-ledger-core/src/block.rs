//! Blocks: immutable, numbered batches of sealed submissions.

use serde::{Deserialize, Serialize};

use crate::canonical::block_body_bytes;
use crate::crypto::KeccakHash;
use crate::merkle::{compute_root, leaf_hashes};
use crate::submission::Submission;

/// A sealed block.
///
/// Everything except `anchor_ref` is fixed at sealing time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, starting at 1.
    pub number: u64,

    /// Integrity hash of the previous block, or the genesis sentinel.
    pub prev_hash: KeccakHash,

    /// Integrity hash over number, prev_hash, submissions and committed_at.
    pub hash: KeccakHash,

    /// Merkle root over the ordered submission leaves.
    pub merkle_root: KeccakHash,

    pub submission_count: u64,

    /// Sealing time (Unix millis).
    pub committed_at: i64,

    /// Reference returned by the external ledger, once published.
    pub anchor_ref: Option<AnchorRef>,
}

impl Block {
    /// Seal `submissions` (in order) into block `number`.
    pub fn seal(
        number: u64,
        prev_hash: KeccakHash,
        submissions: &[Submission],
        committed_at: i64,
    ) -> Self {
        let merkle_root = compute_root(&leaf_hashes(submissions));
        let hash = compute_block_hash(number, &prev_hash, submissions, committed_at);
        Self {
            number,
            prev_hash,
            hash,
            merkle_root,
            submission_count: submissions.len() as u64,
            committed_at,
            anchor_ref: None,
        }
    }

    /// The part of the block handed to an external ledger.
    pub fn commitment(&self) -> BlockCommitment {
        BlockCommitment {
            number: self.number,
            merkle_root: self.merkle_root,
            submission_count: self.submission_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.submission_count == 0
    }

    pub fn head(&self) -> ChainHead {
        ChainHead {
            number: self.number,
            hash: self.hash,
        }
    }
}

/// A block together with its submissions, in block order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlock {
    pub block: Block,
    pub submissions: Vec<Submission>,
}

impl SealedBlock {
    /// Position of `id` within the block.
    pub fn position(&self, id: &crate::types::SubmissionId) -> Option<usize> {
        self.submissions.iter().position(|s| &s.id == id)
    }
}

/// Compute a block's integrity hash.
pub fn compute_block_hash(
    number: u64,
    prev_hash: &KeccakHash,
    submissions: &[Submission],
    committed_at: i64,
) -> KeccakHash {
    KeccakHash::hash(&block_body_bytes(number, prev_hash, submissions, committed_at))
}

/// Reference to a block commitment recorded on an external ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRef {
    /// Opaque reference (e.g. a transaction hash).
    pub reference: String,
    /// When the external ledger recorded it (Unix millis).
    pub timestamp: i64,
}

/// `{number, merkle_root, count}`: what gets published externally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCommitment {
    pub number: u64,
    pub merkle_root: KeccakHash,
    pub submission_count: u64,
}

/// The tip of the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub number: u64,
    pub hash: KeccakHash,
}

impl ChainHead {
    /// Number and prev_hash for the block after `head`.
    ///
    /// An empty chain starts at 1 and links to `genesis`.
    pub fn next(head: Option<&ChainHead>, genesis: KeccakHash) -> (u64, KeccakHash) {
        match head {
            Some(head) => (head.number + 1, head.hash),
            None => (1, genesis),
        }
    }
}
