//! The anchor port: publishing block commitments to an external ledger.
//!
//! Implementations may talk to a smart contract, a notary service, or any
//! other append-only record. The ledger never depends on an anchor for its
//! own consistency.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use confession_ledger_core::{AnchorRef, BlockCommitment};

use crate::error::Result;

/// A commitment as recorded by the external ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub commitment: BlockCommitment,
    pub anchor: AnchorRef,
}

/// External ledger accepting `{number, merkle_root, count}` commitments.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ChainAnchor: Send + Sync {
    /// Publish a block commitment.
    ///
    /// Returns the external reference on success.
    async fn publish(&self, commitment: &BlockCommitment) -> Result<AnchorRef>;

    /// Look up what the external ledger holds for block `number`.
    ///
    /// The external ledger may lag the local chain; `None` is normal for
    /// recent blocks.
    async fn read(&self, number: u64) -> Result<Option<AnchorRecord>>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// An in-process external ledger for testing.
///
/// Failure and latency can be injected to exercise timeout and
/// discard paths.
pub mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
    use std::time::Duration;

    use confession_ledger_core::{now_millis, KeccakHash};
    use tokio::sync::RwLock;

    use crate::error::AnchorError;

    /// In-memory anchor implementation.
    pub struct MemoryAnchor {
        records: RwLock<BTreeMap<u64, AnchorRecord>>,
        reachable: AtomicBool,
        failing_publishes: AtomicU32,
        latency_ms: AtomicU64,
        publish_calls: AtomicU64,
    }

    impl MemoryAnchor {
        pub fn new() -> Self {
            Self {
                records: RwLock::new(BTreeMap::new()),
                reachable: AtomicBool::new(true),
                failing_publishes: AtomicU32::new(0),
                latency_ms: AtomicU64::new(0),
                publish_calls: AtomicU64::new(0),
            }
        }

        /// Toggle whether every call fails with `Unreachable`.
        pub fn set_reachable(&self, reachable: bool) {
            self.reachable.store(reachable, Ordering::SeqCst);
        }

        /// Make the next `n` publishes fail with `Unreachable`.
        pub fn fail_next_publishes(&self, n: u32) {
            self.failing_publishes.store(n, Ordering::SeqCst);
        }

        /// Delay every publish by `latency`.
        pub fn set_latency(&self, latency: Duration) {
            self.latency_ms
                .store(latency.as_millis() as u64, Ordering::SeqCst);
        }

        /// Number of publish calls received, successful or not.
        pub fn publish_calls(&self) -> u64 {
            self.publish_calls.load(Ordering::SeqCst)
        }

        /// All records, ascending by block number.
        pub async fn records(&self) -> Vec<AnchorRecord> {
            self.records.read().await.values().cloned().collect()
        }

        fn check_reachable(&self) -> Result<()> {
            if !self.reachable.load(Ordering::SeqCst) {
                return Err(AnchorError::Unreachable("memory anchor offline".into()));
            }
            Ok(())
        }
    }

    impl Default for MemoryAnchor {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Deterministic stand-in for a transaction hash.
    fn reference_for(commitment: &BlockCommitment) -> String {
        KeccakHash::hash_parts(&[
            &commitment.number.to_be_bytes(),
            commitment.merkle_root.as_bytes(),
            &commitment.submission_count.to_be_bytes(),
        ])
        .to_hex()
    }

    #[async_trait]
    impl ChainAnchor for MemoryAnchor {
        async fn publish(&self, commitment: &BlockCommitment) -> Result<AnchorRef> {
            self.publish_calls.fetch_add(1, Ordering::SeqCst);

            let latency = self.latency_ms.load(Ordering::SeqCst);
            if latency > 0 {
                tokio::time::sleep(Duration::from_millis(latency)).await;
            }

            self.check_reachable()?;
            if self
                .failing_publishes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AnchorError::Unreachable("injected publish failure".into()));
            }

            let mut records = self.records.write().await;
            if let Some(existing) = records.get(&commitment.number) {
                // Republishing the same commitment is idempotent.
                if existing.commitment == *commitment {
                    return Ok(existing.anchor.clone());
                }
                return Err(AnchorError::Rejected(format!(
                    "block {} already anchored with root {}",
                    commitment.number, existing.commitment.merkle_root
                )));
            }

            let anchor = AnchorRef {
                reference: reference_for(commitment),
                timestamp: now_millis(),
            };
            records.insert(
                commitment.number,
                AnchorRecord {
                    commitment: *commitment,
                    anchor: anchor.clone(),
                },
            );
            Ok(anchor)
        }

        async fn read(&self, number: u64) -> Result<Option<AnchorRecord>> {
            self.check_reachable()?;
            Ok(self.records.read().await.get(&number).cloned())
        }

        fn name(&self) -> &str {
            "memory"
        }
    }
}
