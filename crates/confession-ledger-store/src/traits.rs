//! Store trait: the persistence port of the ledger.
//!
//! This trait allows the ledger to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use confession_ledger_core::{
    AnchorRef, Block, ChainHead, SealedBlock, Submission, SubmissionId,
};

use crate::error::{Result, StoreError};

/// Result of inserting a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Submission was inserted and is now pending.
    Inserted,
    /// A submission with the same id already exists (idempotent - not an error).
    AlreadyExists,
}

/// The Store trait: async interface for ledger persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Arrival order**: the store remembers the order submissions were
///   inserted in; pending reads return them oldest first.
/// - **Atomic sealing**: [`commit_block`](Store::commit_block) writes the
///   block and reassigns its submissions as one unit, or writes nothing.
/// - **Compare-and-swap head**: a commit only succeeds if the block extends
///   the current head, so two sealers can never both build on one parent.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Submission Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a pending submission.
    ///
    /// # Returns
    /// - `Inserted` if the submission was new.
    /// - `AlreadyExists` if a submission with the same id is already stored.
    async fn insert_submission(&self, submission: &Submission) -> Result<InsertResult>;

    /// Get a submission by id, pending or sealed.
    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>>;

    /// Check if a submission exists by id.
    async fn has_submission(&self, id: &SubmissionId) -> Result<bool>;

    /// Pending submissions, oldest arrival first, up to `limit` if given.
    async fn pending_submissions(&self, limit: Option<usize>) -> Result<Vec<Submission>>;

    /// Number of pending submissions.
    async fn pending_count(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Chain Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// The latest committed block, or `None` for an empty chain.
    async fn chain_head(&self) -> Result<Option<ChainHead>>;

    /// Atomically insert `block` and seal `submissions` into it, in order.
    ///
    /// Fails with [`StoreError::Conflict`] if `block` does not extend the
    /// current head, or if any submission is already sealed; with
    /// [`StoreError::NotFound`] if any submission is unknown. On any error
    /// nothing is written.
    async fn commit_block(&self, block: &Block, submissions: &[SubmissionId]) -> Result<()>;

    /// Get a block by number.
    async fn get_block(&self, number: u64) -> Result<Option<Block>>;

    /// Submissions sealed into block `number`, in block order.
    async fn block_submissions(&self, number: u64) -> Result<Vec<Submission>>;

    /// Blocks with `number >= from`, ascending, at most `limit`.
    async fn list_blocks(&self, from: u64, limit: usize) -> Result<Vec<Block>>;

    /// Record an external anchor reference on a committed block.
    ///
    /// Overwrites any earlier reference.
    async fn attach_anchor(&self, number: u64, anchor: &AnchorRef) -> Result<()>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Load a block together with its submissions.
    fn sealed_block(
        &self,
        number: u64,
    ) -> impl std::future::Future<Output = Result<Option<SealedBlock>>> + Send;

    /// Block number a submission was sealed into, `None` while pending.
    ///
    /// Fails with `NotFound` for an unknown id.
    fn block_ref(
        &self,
        id: &SubmissionId,
    ) -> impl std::future::Future<Output = Result<Option<u64>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn sealed_block(&self, number: u64) -> Result<Option<SealedBlock>> {
        let Some(block) = self.get_block(number).await? else {
            return Ok(None);
        };
        let submissions = self.block_submissions(number).await?;
        Ok(Some(SealedBlock { block, submissions }))
    }

    async fn block_ref(&self, id: &SubmissionId) -> Result<Option<u64>> {
        self.get_submission(id)
            .await?
            .map(|s| s.block_ref)
            .ok_or_else(|| StoreError::NotFound(format!("submission {}", id.to_hex())))
    }
}
