//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. Seal transactions are
//! a compare-and-swap on the chain head under one write lock.
//!
//! Tests can inject commit failures and commit latency to exercise the
//! sealer's rollback and single-flight paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;

use confession_ledger_core::{AnchorRef, Block, ChainHead, Submission, SubmissionId};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,

    /// Remaining commits to fail with `Unavailable`.
    failing_commits: AtomicU32,

    /// Artificial latency before each commit (millis, 0 = none).
    commit_delay_ms: AtomicU64,

    /// Total `commit_block` calls, successful or not.
    commit_attempts: AtomicU64,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Submissions indexed by id.
    submissions: HashMap<SubmissionId, StoredSubmission>,

    /// Arrival index: arrival -> id, pending submissions only.
    pending: BTreeMap<u64, SubmissionId>,

    /// Next arrival number to hand out.
    next_arrival: u64,

    /// Blocks indexed by number.
    blocks: BTreeMap<u64, Block>,

    /// Block membership, in block order.
    members: HashMap<u64, Vec<SubmissionId>>,
}

struct StoredSubmission {
    submission: Submission,
    arrival: u64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            failing_commits: AtomicU32::new(0),
            commit_delay_ms: AtomicU64::new(0),
            commit_attempts: AtomicU64::new(0),
        }
    }

    /// Make the next `n` calls to `commit_block` fail without writing.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Sleep for `delay` at the start of every `commit_block`.
    pub fn set_commit_delay(&self, delay: Duration) {
        self.commit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `commit_block` calls so far.
    pub fn commit_attempts(&self) -> u64 {
        self.commit_attempts.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn head(&self) -> Option<ChainHead> {
        self.blocks.values().next_back().map(Block::head)
    }

    /// Every check `commit_block` makes, before anything is written.
    fn check_commit(&self, block: &Block, ids: &[SubmissionId]) -> Result<()> {
        match self.head() {
            Some(head) if block.number != head.number + 1 || block.prev_hash != head.hash => {
                return Err(StoreError::Conflict(format!(
                    "block {} does not extend head {}",
                    block.number, head.number
                )));
            }
            None if block.number != 1 => {
                return Err(StoreError::Conflict(format!(
                    "block {} on an empty chain",
                    block.number
                )));
            }
            _ => {}
        }

        if block.submission_count != ids.len() as u64 {
            return Err(StoreError::InvalidData(format!(
                "block {} declares {} submissions, {} given",
                block.number,
                block.submission_count,
                ids.len()
            )));
        }

        for id in ids {
            let stored = self
                .submissions
                .get(id)
                .ok_or_else(|| StoreError::NotFound(format!("submission {}", id.to_hex())))?;
            if let Some(sealed_in) = stored.submission.block_ref {
                return Err(StoreError::Conflict(format!(
                    "submission {} already sealed in block {}",
                    id.to_hex(),
                    sealed_in
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_submission(&self, submission: &Submission) -> Result<InsertResult> {
        let mut inner = self.write()?;

        // Check if the same submission already exists
        if inner.submissions.contains_key(&submission.id) {
            return Ok(InsertResult::AlreadyExists);
        }

        let arrival = inner.next_arrival;
        inner.next_arrival += 1;

        let mut pending = submission.clone();
        pending.block_ref = None;

        inner.pending.insert(arrival, submission.id);
        inner.submissions.insert(
            submission.id,
            StoredSubmission {
                submission: pending,
                arrival,
            },
        );

        Ok(InsertResult::Inserted)
    }

    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>> {
        let inner = self.read()?;
        Ok(inner.submissions.get(id).map(|s| s.submission.clone()))
    }

    async fn has_submission(&self, id: &SubmissionId) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.submissions.contains_key(id))
    }

    async fn pending_submissions(&self, limit: Option<usize>) -> Result<Vec<Submission>> {
        let inner = self.read()?;

        let pending = inner
            .pending
            .values()
            .take(limit.unwrap_or(usize::MAX))
            .filter_map(|id| inner.submissions.get(id))
            .map(|s| s.submission.clone())
            .collect();

        Ok(pending)
    }

    async fn pending_count(&self) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner.pending.len() as u64)
    }

    async fn chain_head(&self) -> Result<Option<ChainHead>> {
        let inner = self.read()?;
        Ok(inner.head())
    }

    async fn commit_block(&self, block: &Block, submissions: &[SubmissionId]) -> Result<()> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.commit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.take_injected_failure() {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }

        let mut guard = self.write()?;
        let inner = &mut *guard;
        inner.check_commit(block, submissions)?;

        // All checks passed; nothing below can fail.
        for id in submissions {
            if let Some(stored) = inner.submissions.get_mut(id) {
                stored.submission.block_ref = Some(block.number);
                let arrival = stored.arrival;
                inner.pending.remove(&arrival);
            }
        }

        let mut stored_block = block.clone();
        stored_block.anchor_ref = None;
        inner.blocks.insert(block.number, stored_block);
        inner.members.insert(block.number, submissions.to_vec());

        Ok(())
    }

    async fn get_block(&self, number: u64) -> Result<Option<Block>> {
        let inner = self.read()?;
        Ok(inner.blocks.get(&number).cloned())
    }

    async fn block_submissions(&self, number: u64) -> Result<Vec<Submission>> {
        let inner = self.read()?;

        let Some(ids) = inner.members.get(&number) else {
            return Ok(Vec::new());
        };

        ids.iter()
            .map(|id| {
                inner
                    .submissions
                    .get(id)
                    .map(|s| s.submission.clone())
                    .ok_or_else(|| {
                        StoreError::InvalidData(format!(
                            "block {} references missing submission {}",
                            number,
                            id.to_hex()
                        ))
                    })
            })
            .collect()
    }

    async fn list_blocks(&self, from: u64, limit: usize) -> Result<Vec<Block>> {
        let inner = self.read()?;
        Ok(inner
            .blocks
            .range(from..)
            .take(limit)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn attach_anchor(&self, number: u64, anchor: &AnchorRef) -> Result<()> {
        let mut inner = self.write()?;
        let block = inner
            .blocks
            .get_mut(&number)
            .ok_or_else(|| StoreError::NotFound(format!("block {}", number)))?;
        block.anchor_ref = Some(anchor.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confession_ledger_core::{Keypair, KeccakHash, ZERO_HASH};

    fn make_submission(keypair: &Keypair, n: u32) -> Submission {
        let content = format!("confession #{}", n);
        let signature = keypair.sign(content.as_bytes()).unwrap();
        Submission::new(keypair.identity(), content, signature, None, 1234567890000 + n as i64)
    }

    async fn seed(store: &MemoryStore, n: u32) -> Vec<Submission> {
        let keypair = Keypair::from_secret(&[0x42; 32]).unwrap();
        let mut out = Vec::new();
        for i in 0..n {
            let s = make_submission(&keypair, i);
            store.insert_submission(&s).await.unwrap();
            out.push(s);
        }
        out
    }

    fn ids(subs: &[Submission]) -> Vec<SubmissionId> {
        subs.iter().map(|s| s.id).collect()
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let subs = seed(&store, 1).await;

        let retrieved = store.get_submission(&subs[0].id).await.unwrap().unwrap();
        assert_eq!(retrieved, subs[0]);
        assert!(store.has_submission(&subs[0].id).await.unwrap());
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_idempotent() {
        let store = MemoryStore::new();
        let subs = seed(&store, 1).await;

        let again = store.insert_submission(&subs[0]).await.unwrap();
        assert_eq!(again, InsertResult::AlreadyExists);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pending_in_arrival_order() {
        let store = MemoryStore::new();
        let subs = seed(&store, 5).await;

        let pending = store.pending_submissions(None).await.unwrap();
        assert_eq!(ids(&pending), ids(&subs));

        let first_two = store.pending_submissions(Some(2)).await.unwrap();
        assert_eq!(ids(&first_two), ids(&subs[..2]));
    }

    #[tokio::test]
    async fn test_commit_block_seals_submissions() {
        let store = MemoryStore::new();
        let subs = seed(&store, 3).await;

        let block = Block::seal(1, ZERO_HASH, &subs[..2], 1000);
        store.commit_block(&block, &ids(&subs[..2])).await.unwrap();

        assert_eq!(store.chain_head().await.unwrap(), Some(block.head()));
        assert_eq!(ids(&store.pending_submissions(None).await.unwrap()), ids(&subs[2..]));

        let sealed = store.block_submissions(1).await.unwrap();
        assert_eq!(ids(&sealed), ids(&subs[..2]));
        assert!(sealed.iter().all(|s| s.block_ref == Some(1)));
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_parent() {
        let store = MemoryStore::new();
        let subs = seed(&store, 2).await;

        let first = Block::seal(1, ZERO_HASH, &subs[..1], 1000);
        store.commit_block(&first, &ids(&subs[..1])).await.unwrap();

        // A racing sealer that also read the empty chain.
        let racer = Block::seal(1, ZERO_HASH, &subs[1..], 1001);
        let err = store.commit_block(&racer, &ids(&subs[1..])).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Nothing from the failed commit leaked in.
        assert_eq!(store.pending_count().await.unwrap(), 1);
        assert_eq!(store.list_blocks(1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        let subs = seed(&store, 2).await;

        let first = Block::seal(1, ZERO_HASH, &subs[..1], 1000);
        store.commit_block(&first, &ids(&subs[..1])).await.unwrap();

        // Second block tries to re-seal subs[0] alongside subs[1].
        let overlap = Block::seal(2, first.hash, &subs, 2000);
        let err = store.commit_block(&overlap, &ids(&subs)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let still_pending = store.get_submission(&subs[1].id).await.unwrap().unwrap();
        assert!(still_pending.is_pending());
        assert!(store.get_block(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_unknown_submission() {
        let store = MemoryStore::new();
        let keypair = Keypair::generate();
        let ghost = make_submission(&keypair, 9);

        let block = Block::seal(1, ZERO_HASH, std::slice::from_ref(&ghost), 1000);
        let err = store.commit_block(&block, &[ghost.id]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        let subs = seed(&store, 1).await;
        store.fail_next_commits(2);

        let block = Block::seal(1, ZERO_HASH, &subs, 1000);
        for _ in 0..2 {
            let err = store.commit_block(&block, &ids(&subs)).await.unwrap_err();
            assert!(matches!(err, StoreError::Unavailable(_)));
        }
        store.commit_block(&block, &ids(&subs)).await.unwrap();
        assert_eq!(store.commit_attempts(), 3);
    }

    #[tokio::test]
    async fn test_attach_anchor() {
        let store = MemoryStore::new();
        let block = Block::seal(1, ZERO_HASH, &[], 1000);
        store.commit_block(&block, &[]).await.unwrap();

        let anchor = AnchorRef {
            reference: "0xabc".into(),
            timestamp: 5,
        };
        store.attach_anchor(1, &anchor).await.unwrap();
        let stored = store.get_block(1).await.unwrap().unwrap();
        assert_eq!(stored.anchor_ref, Some(anchor.clone()));

        let err = store.attach_anchor(2, &anchor).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_delay() {
        let store = MemoryStore::new();
        store.set_commit_delay(Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        let block = Block::seal(1, KeccakHash::ZERO, &[], 1000);
        store.commit_block(&block, &[]).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
