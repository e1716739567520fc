//! Merkle commitments over ordered submission leaves.
//!
//! The tree is built bottom-up by pairing adjacent nodes left to right. An
//! unpaired trailing node is promoted to the next level unchanged: there is no
//! duplication or padding, so a tree over `n` leaves has exactly `n - 1`
//! interior hashes.
//!
//! Pairs are hashed commutatively (`hash_pair(a, b) == hash_pair(b, a)`), so
//! a proof is just the list of siblings, without left/right markers.

use serde::{Deserialize, Serialize};

use crate::canonical::leaf_bytes;
use crate::crypto::KeccakHash;
use crate::submission::Submission;

/// Root of an empty tree.
pub const ZERO_HASH: KeccakHash = KeccakHash::ZERO;

/// Hash a submission into a leaf.
pub fn leaf_hash(submission: &Submission) -> KeccakHash {
    KeccakHash::hash(&leaf_bytes(submission))
}

/// Leaf hashes for an ordered list of submissions.
pub fn leaf_hashes(submissions: &[Submission]) -> Vec<KeccakHash> {
    submissions.iter().map(leaf_hash).collect()
}

/// Hash two nodes, smaller first.
pub fn hash_pair(a: &KeccakHash, b: &KeccakHash) -> KeccakHash {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    KeccakHash::hash_parts(&[lo.as_bytes(), hi.as_bytes()])
}

/// Compute the root over ordered leaves.
///
/// Returns [`ZERO_HASH`] for no leaves and the leaf itself for one.
pub fn compute_root(leaves: &[KeccakHash]) -> KeccakHash {
    match leaves {
        [] => ZERO_HASH,
        [only] => *only,
        _ => {
            let mut level = leaves.to_vec();
            while level.len() > 1 {
                level = next_level(&level);
            }
            level[0]
        }
    }
}

/// Collect the siblings needed to recompute the root from `leaves[index]`.
///
/// Returns `None` if `index` is out of range. Levels where the target is the
/// unpaired trailing node contribute nothing.
pub fn generate_proof(leaves: &[KeccakHash], index: usize) -> Option<MerkleProof> {
    if index >= leaves.len() {
        return None;
    }

    let mut siblings = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;

    while level.len() > 1 {
        let sibling = position ^ 1;
        if sibling < level.len() {
            siblings.push(level[sibling]);
        }
        level = next_level(&level);
        position /= 2;
    }

    Some(MerkleProof { index, siblings })
}

/// Fold `proof` into `leaf` and compare against `root`.
pub fn verify_proof(leaf: &KeccakHash, proof: &[KeccakHash], root: &KeccakHash) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |acc, sibling| hash_pair(&acc, sibling));
    computed == *root
}

fn next_level(level: &[KeccakHash]) -> Vec<KeccakHash> {
    level
        .chunks(2)
        .map(|pair| pair.get(1).map_or(pair[0], |b| hash_pair(&pair[0], b)))
        .collect()
}

/// An inclusion proof: the sibling path from one leaf to the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Position of the leaf within the block.
    pub index: usize,
    /// Siblings from the leaf level upward.
    pub siblings: Vec<KeccakHash>,
}

impl MerkleProof {
    /// Verify this proof for `leaf` against `root`.
    pub fn verify(&self, leaf: &KeccakHash, root: &KeccakHash) -> bool {
        verify_proof(leaf, &self.siblings, root)
    }

    pub fn len(&self) -> usize {
        self.siblings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }
}

/// A fully materialized tree, for producing many proofs over the same leaves.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// `layers[0]` holds the leaves, the last layer holds the root.
    layers: Vec<Vec<KeccakHash>>,
}

impl MerkleTree {
    pub fn from_leaves(leaves: Vec<KeccakHash>) -> Self {
        let mut layers = vec![leaves];
        while let Some(top) = layers.last() {
            if top.len() <= 1 {
                break;
            }
            let next = next_level(top);
            layers.push(next);
        }
        Self { layers }
    }

    pub fn from_submissions(submissions: &[Submission]) -> Self {
        Self::from_leaves(leaf_hashes(submissions))
    }

    pub fn root(&self) -> KeccakHash {
        self.layers
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(ZERO_HASH)
    }

    pub fn leaves(&self) -> &[KeccakHash] {
        self.layers.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Number of levels above the leaves.
    pub fn depth(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }

    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut siblings = Vec::new();
        let mut position = index;
        for layer in &self.layers[..self.depth()] {
            let sibling = position ^ 1;
            if sibling < layer.len() {
                siblings.push(layer[sibling]);
            }
            position /= 2;
        }

        Some(MerkleProof { index, siblings })
    }
}
