//! # Block Sealer
//!
//! Moves pending submissions from the mempool into a new block.
//!
//! ## States
//!
//! ```text
//! Idle ──▶ Sealing ──▶ Committed ──▶ (next seal)
//!              │
//!              └─────▶ Failed ─────▶ (next seal, retried)
//! ```
//!
//! `Committed` and `Failed` describe the last attempt; both behave like
//! `Idle` for the next trigger.
//!
//! ## Guarantees
//!
//! - **Single flight**: a `seal()` that finds another one in progress
//!   returns `Ok(None)` without touching anything
//! - **All or nothing**: the block and its submission reassignment are one
//!   store call; on failure the snapshot goes back to the mempool, minus
//!   anything the store reports as already sealed or unknown
//! - **Anchor is out of band**: publishing runs in its own task after the
//!   commit and can only ever add an `anchor_ref`

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use confession_ledger_anchor::AnchorClient;
use confession_ledger_core::{
    now_millis, Block, BlockCommitment, ChainHead, KeccakHash, SealedBlock,
};
use confession_ledger_store::{Store, StoreError};
use tokio::task::JoinHandle;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::events::{EventBus, LedgerEvent};
use crate::mempool::{Mempool, Snapshot};

/// Where the sealer is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealerState {
    Idle,
    Sealing,
    /// The last attempt produced a block.
    Committed,
    /// The last attempt failed; its submissions are pending again.
    Failed,
}

/// Snapshot of sealer health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealerStatus {
    pub state: SealerState,
    /// Number of the last block this sealer committed.
    pub last_sealed: Option<u64>,
    pub blocks_sealed: u64,
    /// Failed attempts since the last commit.
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl Default for SealerStatus {
    fn default() -> Self {
        Self {
            state: SealerState::Idle,
            last_sealed: None,
            blocks_sealed: 0,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

/// Seals mempool snapshots into blocks.
pub struct BlockSealer<S: Store> {
    store: Arc<S>,
    mempool: Arc<Mempool>,
    events: EventBus,
    anchor: AnchorClient,
    genesis_hash: KeccakHash,
    max_per_block: usize,
    seal_empty_blocks: bool,
    /// Held for the whole of a seal.
    flight: tokio::sync::Mutex<()>,
    status: Mutex<SealerStatus>,
    anchor_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: Store + 'static> BlockSealer<S> {
    pub fn new(
        store: Arc<S>,
        mempool: Arc<Mempool>,
        events: EventBus,
        anchor: AnchorClient,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            mempool,
            events,
            anchor,
            genesis_hash: config.genesis_hash,
            max_per_block: config.max_submissions_per_block,
            seal_empty_blocks: config.seal_empty_blocks,
            flight: tokio::sync::Mutex::new(()),
            status: Mutex::new(SealerStatus::default()),
            anchor_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Seal the oldest pending submissions into the next block.
    ///
    /// # Returns
    /// - `Ok(Some(block))` when a block was committed.
    /// - `Ok(None)` when another seal is in progress, or the mempool is
    ///   empty and empty blocks are disabled.
    /// - `Err` when the store failed; the snapshot is pending again and the
    ///   next call retries it. Entries that caused a conflict or were not
    ///   found are dropped rather than retried.
    pub async fn seal(&self) -> Result<Option<SealedBlock>> {
        let Ok(_flight) = self.flight.try_lock() else {
            tracing::debug!("seal already in progress");
            return Ok(None);
        };
        self.set_state(SealerState::Sealing);

        let head = match self.store.chain_head().await {
            Ok(head) => head,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read chain head");
                return Err(self.record_failure(e));
            }
        };
        let (number, prev_hash) = ChainHead::next(head.as_ref(), self.genesis_hash);

        let snapshot = self.mempool.snapshot_and_remove(self.max_per_block);
        if snapshot.is_empty() && !self.seal_empty_blocks {
            self.set_state(SealerState::Idle);
            return Ok(None);
        }

        let mut submissions = snapshot.submissions();
        let block = Block::seal(number, prev_hash, &submissions, now_millis());

        if let Err(e) = self.store.commit_block(&block, &snapshot.ids()).await {
            let mut snapshot = snapshot;
            if matches!(e, StoreError::Conflict(_) | StoreError::NotFound(_)) {
                self.drop_settled(&mut snapshot).await;
            }
            let count = snapshot.len();
            self.mempool.restore(snapshot);
            tracing::warn!(
                block = number,
                count,
                error = %e,
                "seal failed, submissions returned to mempool"
            );
            return Err(self.record_failure(e));
        }

        for submission in &mut submissions {
            submission.block_ref = Some(number);
        }
        let sealed = SealedBlock { block, submissions };
        self.record_commit(number);

        tracing::info!(
            block = number,
            count = sealed.block.submission_count,
            hash = %sealed.block.hash,
            merkle_root = %sealed.block.merkle_root,
            "block sealed"
        );

        self.events.publish(LedgerEvent::BlockSealed(sealed.clone()));
        self.spawn_anchor(sealed.block.commitment());

        Ok(Some(sealed))
    }

    /// Append the store's pending submissions to the mempool.
    ///
    /// Waits for any seal in progress and holds off new ones, so nothing
    /// a seal has taken out of the mempool can come back in behind it.
    /// Returns `(pending in store, added to mempool)`.
    pub async fn rehydrate(&self) -> Result<(usize, usize)> {
        let _flight = self.flight.lock().await;
        let pending = self.store.pending_submissions(None).await?;
        let total = pending.len();
        let added = pending
            .into_iter()
            .filter(|s| self.mempool.append(s.clone()))
            .count();
        Ok((total, added))
    }

    /// Remove snapshot entries the store no longer holds as pending.
    ///
    /// A submission that is unknown or already sealed would fail every
    /// later commit.
    async fn drop_settled(&self, snapshot: &mut Snapshot) {
        let mut settled = HashSet::new();
        for id in snapshot.ids() {
            match self.store.get_submission(&id).await {
                Ok(Some(stored)) if stored.block_ref.is_none() => {}
                Ok(Some(stored)) => {
                    tracing::warn!(
                        id = %id,
                        block = ?stored.block_ref,
                        "dropping sealed submission"
                    );
                    settled.insert(id);
                }
                Ok(None) => {
                    tracing::warn!(id = %id, "dropping unknown submission");
                    settled.insert(id);
                }
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "could not check submission, keeping it");
                }
            }
        }
        snapshot.retain(|s| !settled.contains(&s.id));
    }

    pub fn status(&self) -> SealerStatus {
        self.lock_status().clone()
    }

    /// Whether a seal is running right now.
    pub fn is_sealing(&self) -> bool {
        self.flight.try_lock().is_err()
    }

    /// Wait for every anchor publication started so far.
    pub async fn flush_anchors(&self) {
        let tasks = std::mem::take(&mut *self.lock_tasks());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "anchor task aborted");
            }
        }
    }

    fn spawn_anchor(&self, commitment: BlockCommitment) {
        if !self.anchor.is_configured() {
            return;
        }

        let anchor = self.anchor.clone();
        let store = Arc::clone(&self.store);
        let task = tokio::spawn(async move {
            let Some(reference) = anchor.publish(&commitment).await else {
                return;
            };
            if let Err(e) = store.attach_anchor(commitment.number, &reference).await {
                tracing::warn!(
                    block = commitment.number,
                    error = %e,
                    "failed to record anchor reference"
                );
            }
        });

        let mut tasks = self.lock_tasks();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    fn set_state(&self, state: SealerState) {
        self.lock_status().state = state;
    }

    fn record_commit(&self, number: u64) {
        let mut status = self.lock_status();
        status.state = SealerState::Committed;
        status.last_sealed = Some(number);
        status.blocks_sealed += 1;
        status.consecutive_failures = 0;
        status.last_error = None;
    }

    fn record_failure(&self, error: StoreError) -> LedgerError {
        let mut status = self.lock_status();
        status.state = SealerState::Failed;
        status.consecutive_failures += 1;
        status.last_error = Some(error.to_string());
        error.into()
    }

    fn lock_status(&self) -> MutexGuard<'_, SealerStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.anchor_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confession_ledger_anchor::MemoryAnchor;
    use confession_ledger_core::{compute_root, leaf_hash, SubmissionId, ZERO_HASH};
    use confession_ledger_store::{MemoryStore, StoreExt};
    use confession_ledger_testkit::TestSigner;
    use std::time::Duration;

    struct Harness {
        store: Arc<MemoryStore>,
        mempool: Arc<Mempool>,
        events: EventBus,
        sealer: BlockSealer<MemoryStore>,
    }

    fn harness(config: LedgerConfig, anchor: AnchorClient) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let mempool = Arc::new(Mempool::new());
        let events = EventBus::new(16);
        let sealer = BlockSealer::new(
            Arc::clone(&store),
            Arc::clone(&mempool),
            events.clone(),
            anchor,
            &config,
        );
        Harness {
            store,
            mempool,
            events,
            sealer,
        }
    }

    impl Harness {
        async fn admit(&self, count: usize) -> Vec<SubmissionId> {
            let signer = TestSigner::from_seed(1);
            let mut ids = Vec::new();
            for i in 0..count {
                let s = signer.submission(&format!("pending #{i}"), 1_000 + i as i64);
                self.store.insert_submission(&s).await.unwrap();
                ids.push(s.id);
                assert!(self.mempool.append(s));
            }
            ids
        }
    }

    #[tokio::test]
    async fn test_seals_pending_in_arrival_order() {
        let h = harness(LedgerConfig::default(), AnchorClient::disabled());
        let ids = h.admit(3).await;

        let sealed = h.sealer.seal().await.unwrap().unwrap();
        assert_eq!(sealed.block.number, 1);
        assert_eq!(sealed.block.prev_hash, ZERO_HASH);
        assert_eq!(sealed.block.submission_count, 3);

        let sealed_ids: Vec<_> = sealed.submissions.iter().map(|s| s.id).collect();
        assert_eq!(sealed_ids, ids);
        assert!(sealed.submissions.iter().all(|s| s.block_ref == Some(1)));

        let leaves: Vec<_> = sealed.submissions.iter().map(leaf_hash).collect();
        assert_eq!(sealed.block.merkle_root, compute_root(&leaves));

        assert!(h.mempool.is_empty());
        assert_eq!(h.store.block_ref(&ids[0]).await.unwrap(), Some(1));
        assert_eq!(h.store.pending_count().await.unwrap(), 0);

        let status = h.sealer.status();
        assert_eq!(status.state, SealerState::Committed);
        assert_eq!(status.last_sealed, Some(1));
        assert_eq!(status.blocks_sealed, 1);
    }

    #[tokio::test]
    async fn test_empty_block_links_to_previous() {
        let h = harness(LedgerConfig::default(), AnchorClient::disabled());
        h.admit(1).await;

        let first = h.sealer.seal().await.unwrap().unwrap();
        let second = h.sealer.seal().await.unwrap().unwrap();

        assert_eq!(second.block.number, 2);
        assert_eq!(second.block.prev_hash, first.block.hash);
        assert_eq!(second.block.submission_count, 0);
        assert_eq!(second.block.merkle_root, ZERO_HASH);
    }

    #[tokio::test]
    async fn test_skips_empty_block_when_disabled() {
        let config = LedgerConfig {
            seal_empty_blocks: false,
            ..Default::default()
        };
        let h = harness(config, AnchorClient::disabled());

        assert!(h.sealer.seal().await.unwrap().is_none());
        assert!(h.store.chain_head().await.unwrap().is_none());
        assert_eq!(h.sealer.status().state, SealerState::Idle);
    }

    #[tokio::test]
    async fn test_block_size_is_capped() {
        let config = LedgerConfig {
            max_submissions_per_block: 2,
            ..Default::default()
        };
        let h = harness(config, AnchorClient::disabled());
        let ids = h.admit(5).await;

        let sealed = h.sealer.seal().await.unwrap().unwrap();
        assert_eq!(sealed.block.submission_count, 2);
        assert_eq!(h.mempool.ids(), ids[2..]);
    }

    #[tokio::test]
    async fn test_failed_commit_restores_snapshot() {
        let h = harness(LedgerConfig::default(), AnchorClient::disabled());
        let ids = h.admit(3).await;

        h.store.fail_next_commits(1);
        let err = h.sealer.seal().await.unwrap_err();
        assert!(matches!(err, LedgerError::Store(StoreError::Unavailable(_))));

        assert_eq!(h.mempool.ids(), ids);
        assert!(h.store.chain_head().await.unwrap().is_none());
        let status = h.sealer.status();
        assert_eq!(status.state, SealerState::Failed);
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_error.is_some());

        let sealed = h.sealer.seal().await.unwrap().unwrap();
        let sealed_ids: Vec<_> = sealed.submissions.iter().map(|s| s.id).collect();
        assert_eq!(sealed.block.number, 1);
        assert_eq!(sealed_ids, ids);
        assert_eq!(h.sealer.status().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_seals_produce_one_block() {
        let h = harness(LedgerConfig::default(), AnchorClient::disabled());
        h.admit(4).await;
        h.store.set_commit_delay(Duration::from_millis(500));

        let (a, b) = tokio::join!(h.sealer.seal(), h.sealer.seal());
        let produced: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();

        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].block.submission_count, 4);
        assert_eq!(h.store.commit_attempts(), 1);
        assert_eq!(h.store.chain_head().await.unwrap().unwrap().number, 1);
        assert!(h.mempool.is_empty());
    }

    #[tokio::test]
    async fn test_emits_block_sealed_event() {
        let h = harness(LedgerConfig::default(), AnchorClient::disabled());
        let mut events = h.events.subscribe();
        h.admit(2).await;

        let sealed = h.sealer.seal().await.unwrap().unwrap();
        match events.recv().await.unwrap() {
            LedgerEvent::BlockSealed(event) => assert_eq!(event, sealed),
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_anchor_reference_attached() {
        let anchor = Arc::new(MemoryAnchor::new());
        let client = AnchorClient::new(anchor.clone(), Duration::from_secs(1));
        let h = harness(LedgerConfig::default(), client);
        h.admit(2).await;

        let sealed = h.sealer.seal().await.unwrap().unwrap();
        h.sealer.flush_anchors().await;

        let stored = h.store.get_block(1).await.unwrap().unwrap();
        let record = anchor.records().await.pop().unwrap();
        assert_eq!(record.commitment, sealed.block.commitment());
        assert_eq!(stored.anchor_ref, Some(record.anchor));
    }

    #[tokio::test]
    async fn test_anchor_failure_does_not_affect_block() {
        let anchor = Arc::new(MemoryAnchor::new());
        anchor.set_reachable(false);
        let client = AnchorClient::new(anchor.clone(), Duration::from_secs(1));
        let h = harness(LedgerConfig::default(), client);
        h.admit(1).await;

        let sealed = h.sealer.seal().await.unwrap().unwrap();
        h.sealer.flush_anchors().await;

        assert_eq!(anchor.publish_calls(), 1);
        let stored = h.store.get_block(1).await.unwrap().unwrap();
        assert_eq!(stored.hash, sealed.block.hash);
        assert!(stored.anchor_ref.is_none());
        assert_eq!(h.sealer.status().state, SealerState::Committed);
    }
}
