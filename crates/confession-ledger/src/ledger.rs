//! The Ledger: unified API for the confession ledger engine.
//!
//! The Ledger owns the admission pipeline (verify, validate, rate-limit,
//! store, enqueue), the block sealer and the event stream, and exposes
//! read-side helpers for proofs and verification.

use std::sync::Arc;

use confession_ledger_anchor::{AnchorClient, AnchorRecord, ChainAnchor};
use confession_ledger_core::{
    leaf_hash, now_millis, validate_content, verify_block, verify_link, Block, ChainHead,
    Identity, KeccakHash, MerkleProof, MerkleTree, RecoverableSignature, SealedBlock,
    SignatureVerifier, Submission, SubmissionId, SubmissionRequest, ValidationError,
};
use confession_ledger_store::{InsertResult, Store, StoreError, StoreExt};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::admission::{Admission, AdmissionController, Quota, Rejection};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::events::{EventBus, LedgerEvent};
use crate::mempool::Mempool;
use crate::sealer::{BlockSealer, SealerStatus};

/// Blocks fetched per page by [`Ledger::verify_chain`].
const VERIFY_PAGE: usize = 64;

/// Everything needed to check one submission against a block's Merkle root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    pub block_number: u64,
    /// Position of the submission within the block.
    pub index: usize,
    pub leaf: KeccakHash,
    pub proof: MerkleProof,
    pub merkle_root: KeccakHash,
}

impl InclusionProof {
    pub fn verify(&self) -> bool {
        self.proof.verify(&self.leaf, &self.merkle_root)
    }
}

/// The main Ledger struct.
///
/// Provides a unified API for:
/// - Admitting signed submissions
/// - Sealing blocks, on demand or on a timer
/// - Subscribing to ledger events
/// - Inclusion proofs and chain verification
pub struct Ledger<S: Store + 'static> {
    config: LedgerConfig,
    store: Arc<S>,
    verifier: SignatureVerifier,
    admission: AdmissionController,
    mempool: Arc<Mempool>,
    /// Held from store insert to mempool append, so both see one order.
    enqueue: tokio::sync::Mutex<()>,
    events: EventBus,
    anchor: AnchorClient,
    sealer: BlockSealer<S>,
}

impl<S: Store + 'static> Ledger<S> {
    /// Create a ledger with no external anchor.
    pub fn new(store: S, config: LedgerConfig) -> Result<Self> {
        Self::with_parts(Arc::new(store), AnchorClient::disabled(), config)
    }

    /// Create a ledger that publishes block commitments to `anchor`.
    pub fn with_anchor(
        store: S,
        anchor: Arc<dyn ChainAnchor>,
        config: LedgerConfig,
    ) -> Result<Self> {
        let client = AnchorClient::new(anchor, config.anchor_timeout());
        Self::with_parts(Arc::new(store), client, config)
    }

    /// Create a ledger over a shared store.
    pub fn with_parts(store: Arc<S>, anchor: AnchorClient, config: LedgerConfig) -> Result<Self> {
        config.validate()?;

        let mempool = Arc::new(Mempool::new());
        let events = EventBus::new(config.event_capacity);
        let sealer = BlockSealer::new(
            Arc::clone(&store),
            Arc::clone(&mempool),
            events.clone(),
            anchor.clone(),
            &config,
        );

        Ok(Self {
            admission: AdmissionController::from_config(&config.rate_limit),
            verifier: SignatureVerifier::new(),
            config,
            store,
            mempool,
            enqueue: tokio::sync::Mutex::new(()),
            events,
            anchor,
            sealer,
        })
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admission
    // ─────────────────────────────────────────────────────────────────────────

    /// Admit a signed submission.
    ///
    /// Checks run in order: content and category, signature against the
    /// claimed identity, rate limit. The first failing check decides the
    /// [`Rejection`]; a rejected request does not consume quota unless it
    /// got as far as the rate limit.
    ///
    /// Errors are reserved for the store failing.
    pub async fn admit_submission(&self, request: SubmissionRequest) -> Result<Admission> {
        let SubmissionRequest {
            content,
            signature,
            identity,
            category,
        } = request;

        if let Err(e) = validate_content(
            &content,
            category.as_deref(),
            self.config.max_content_length,
            &self.config.categories,
        ) {
            return Ok(Admission::Rejected(rejection_for(e)?));
        }

        let Some((author, signature)) = self.authenticate(&content, &signature, &identity) else {
            tracing::debug!(claimed = %identity, "signature does not match identity");
            return Ok(Admission::Rejected(Rejection::InvalidSignature));
        };

        let remaining_quota = match self.admission.check_and_consume(&author) {
            Quota::Allowed { remaining } => remaining,
            Quota::Denied { retry_after } => {
                tracing::debug!(identity = %author, "rate limited");
                return Ok(Admission::Rejected(Rejection::RateLimited { retry_after }));
            }
        };

        let submission = Submission::new(author, content, signature, category, now_millis());
        let id = submission.id;

        let enqueue = self.enqueue.lock().await;
        match self.store.insert_submission(&submission).await? {
            InsertResult::Inserted => {
                self.mempool.append(submission.clone());
                drop(enqueue);
                tracing::debug!(id = %id, identity = %author, "submission admitted");
                self.events.publish(LedgerEvent::SubmissionAdmitted(submission));
            }
            InsertResult::AlreadyExists => {
                tracing::debug!(id = %id, "duplicate submission");
            }
        }

        Ok(Admission::Accepted {
            id,
            remaining_quota,
        })
    }

    /// Parse the claimed identity and signature and check they agree.
    fn authenticate(
        &self,
        content: &str,
        signature: &str,
        identity: &str,
    ) -> Option<(Identity, RecoverableSignature)> {
        let claimed = Identity::parse(identity).ok()?;
        let signature = RecoverableSignature::from_hex(signature).ok()?;
        let recovered = self.verifier.verify(content.as_bytes(), &signature)?;
        (recovered == claimed).then_some((claimed, signature))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sealing
    // ─────────────────────────────────────────────────────────────────────────

    /// Seal now, outside the schedule. See [`BlockSealer::seal`].
    pub async fn seal_now(&self) -> Result<Option<SealedBlock>> {
        self.sealer.seal().await
    }

    pub fn sealer_status(&self) -> SealerStatus {
        self.sealer.status()
    }

    /// Wait for in-flight anchor publications.
    pub async fn flush_anchors(&self) {
        self.sealer.flush_anchors().await;
    }

    /// Reload pending submissions from the store into the mempool.
    ///
    /// Call once at startup. Safe to call while sealing or admitting: it
    /// waits for an in-progress seal. Returns how many were added.
    pub async fn recover(&self) -> Result<usize> {
        let (total, added) = {
            let _enqueue = self.enqueue.lock().await;
            self.sealer.rehydrate().await?
        };

        let head = self.store.chain_head().await?;
        tracing::info!(
            pending = total,
            added,
            head = head.map(|h| h.number).unwrap_or(0),
            "ledger recovered"
        );
        Ok(added)
    }

    /// Run the sealing and sweeping timers until `shutdown` turns true or
    /// its sender is dropped.
    ///
    /// The first scheduled seal happens one interval after start. Seal
    /// failures are logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut seal_tick = tokio::time::interval(self.config.block_interval());
        seal_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        seal_tick.tick().await;

        let mut sweep_tick = tokio::time::interval(self.config.rate_limit.sweep_interval());
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        sweep_tick.tick().await;

        tracing::info!(
            interval_ms = self.config.block_interval_ms,
            max_per_block = self.config.max_submissions_per_block,
            "sealing loop started"
        );

        loop {
            tokio::select! {
                _ = seal_tick.tick() => {
                    // Failures are already logged and counted by the sealer.
                    let _ = self.sealer.seal().await;
                }
                _ = sweep_tick.tick() => {
                    let swept = self.admission.sweep();
                    tracing::trace!(swept, tracked = self.admission.tracked(), "rate limit sweep");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.sealer.flush_anchors().await;
        tracing::info!("sealing loop stopped");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>> {
        Ok(self.store.get_submission(id).await?)
    }

    pub async fn get_block(&self, number: u64) -> Result<Option<Block>> {
        Ok(self.store.get_block(number).await?)
    }

    pub async fn sealed_block(&self, number: u64) -> Result<Option<SealedBlock>> {
        Ok(self.store.sealed_block(number).await?)
    }

    pub async fn chain_head(&self) -> Result<Option<ChainHead>> {
        Ok(self.store.chain_head().await?)
    }

    /// Number of submissions waiting for a block.
    pub fn pending_count(&self) -> usize {
        self.mempool.len()
    }

    /// Merkle inclusion proof for a sealed submission.
    ///
    /// `Ok(None)` while the submission is pending.
    pub async fn inclusion_proof(&self, id: &SubmissionId) -> Result<Option<InclusionProof>> {
        let block_number = match self.store.block_ref(id).await {
            Ok(Some(number)) => number,
            Ok(None) => return Ok(None),
            Err(StoreError::NotFound(_)) => {
                return Err(LedgerError::SubmissionNotFound(id.to_hex()))
            }
            Err(e) => return Err(e.into()),
        };

        let sealed = self
            .store
            .sealed_block(block_number)
            .await?
            .ok_or(LedgerError::BlockNotFound(block_number))?;
        let tree = MerkleTree::from_submissions(&sealed.submissions);
        let Some((index, proof)) = sealed
            .position(id)
            .and_then(|index| Some((index, tree.proof(index)?)))
        else {
            return Err(StoreError::InvalidData(format!(
                "submission {} missing from block {}",
                id.to_hex(),
                block_number
            ))
            .into());
        };

        Ok(Some(InclusionProof {
            block_number,
            index,
            leaf: leaf_hash(&sealed.submissions[index]),
            proof,
            merkle_root: sealed.block.merkle_root,
        }))
    }

    /// Walk the whole chain and check every block and link.
    ///
    /// Returns the number of blocks checked; the first inconsistency is
    /// returned as [`LedgerError::Validation`].
    pub async fn verify_chain(&self) -> Result<u64> {
        let mut prev: Option<Block> = None;
        let mut checked = 0u64;
        let mut from = 1;

        loop {
            let page = self.store.list_blocks(from, VERIFY_PAGE).await?;
            let Some(last) = page.last() else {
                break;
            };
            from = last.number + 1;

            for block in page {
                let submissions = self.store.block_submissions(block.number).await?;
                verify_link(&block, prev.as_ref(), &self.config.genesis_hash)?;
                verify_block(&block, &submissions)?;
                checked += 1;
                prev = Some(block);
            }
        }

        tracing::debug!(blocks = checked, "chain verified");
        Ok(checked)
    }

    /// What the external ledger holds for block `number`.
    ///
    /// May lag the local chain; `None` is expected for recent blocks and
    /// when no anchor is configured.
    pub async fn anchor_record(&self, number: u64) -> Result<Option<AnchorRecord>> {
        Ok(self.anchor.read(number).await?)
    }
}

/// Map a content check failure onto its rejection code.
fn rejection_for(error: ValidationError) -> Result<Rejection> {
    match error {
        ValidationError::EmptyContent => Ok(Rejection::EmptyContent),
        ValidationError::ContentTooLong { len, max } => Ok(Rejection::TooLong { len, max }),
        ValidationError::InvalidCategory(category) => Ok(Rejection::InvalidCategory(category)),
        other => Err(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confession_ledger_store::MemoryStore;
    use confession_ledger_testkit::TestSigner;

    fn ledger() -> Ledger<MemoryStore> {
        Ledger::new(MemoryStore::new(), LedgerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_accepts_valid_submission() {
        let ledger = ledger();
        let signer = TestSigner::from_seed(1);

        let admission = ledger
            .admit_submission(signer.request("i never returned the library book"))
            .await
            .unwrap();

        let Admission::Accepted {
            id,
            remaining_quota,
        } = admission
        else {
            panic!("expected acceptance, got {admission:?}");
        };
        assert_eq!(remaining_quota, 4);
        assert!(ledger.mempool().contains(&id));

        let stored = ledger.get_submission(&id).await.unwrap().unwrap();
        assert_eq!(stored.author, signer.identity());
        assert!(stored.is_pending());
    }

    #[tokio::test]
    async fn test_identity_mismatch_is_invalid_signature() {
        let ledger = ledger();
        let alice = TestSigner::from_seed(1);
        let bob = TestSigner::from_seed(2);

        let mut request = alice.request("not mine");
        request.identity = bob.identity().to_hex();

        let admission = ledger.admit_submission(request).await.unwrap();
        assert_eq!(admission, Admission::Rejected(Rejection::InvalidSignature));
        assert_eq!(ledger.pending_count(), 0);
        assert_eq!(ledger.admission().tracked(), 0);
    }

    #[tokio::test]
    async fn test_malformed_signature_is_invalid_signature() {
        let ledger = ledger();
        let signer = TestSigner::from_seed(1);

        let mut request = signer.request("hello");
        request.signature = "0xdeadbeef".into();
        let admission = ledger.admit_submission(request).await.unwrap();
        assert_eq!(admission.rejection(), Some(&Rejection::InvalidSignature));

        let mut request = signer.request("hello");
        request.identity = "not an address".into();
        let admission = ledger.admit_submission(request).await.unwrap();
        assert_eq!(admission.rejection(), Some(&Rejection::InvalidSignature));
    }

    #[tokio::test]
    async fn test_signature_over_other_content_rejected() {
        let ledger = ledger();
        let signer = TestSigner::from_seed(1);

        let mut request = signer.request("original");
        request.content = "tampered".into();

        let admission = ledger.admit_submission(request).await.unwrap();
        assert_eq!(admission.rejection(), Some(&Rejection::InvalidSignature));
    }

    #[tokio::test]
    async fn test_content_rules() {
        let config = LedgerConfig {
            max_content_length: 10,
            ..Default::default()
        };
        let ledger = Ledger::new(MemoryStore::new(), config).unwrap();
        let signer = TestSigner::from_seed(1);

        let too_long = ledger
            .admit_submission(signer.request("this is far too long"))
            .await
            .unwrap();
        assert_eq!(too_long.rejection().map(Rejection::as_str), Some("too_long"));

        let blank = ledger.admit_submission(signer.request("   ")).await.unwrap();
        assert_eq!(blank.rejection(), Some(&Rejection::EmptyContent));

        let category = ledger
            .admit_submission(signer.request_with_category("short", "gossip"))
            .await
            .unwrap();
        assert_eq!(
            category.rejection(),
            Some(&Rejection::InvalidCategory("gossip".into()))
        );

        let ok = ledger
            .admit_submission(signer.request_with_category("short", "regret"))
            .await
            .unwrap();
        assert!(ok.is_accepted());
    }

    #[tokio::test]
    async fn test_sixth_submission_rate_limited() {
        let ledger = ledger();
        let signer = TestSigner::from_seed(1);

        for i in 0..5u32 {
            let admission = ledger
                .admit_submission(signer.request(&format!("secret {i}")))
                .await
                .unwrap();
            assert_eq!(
                admission,
                Admission::Accepted {
                    id: admission.id().unwrap(),
                    remaining_quota: 4 - i,
                }
            );
        }

        let sixth = ledger
            .admit_submission(signer.request("one too many"))
            .await
            .unwrap();
        assert_eq!(sixth.rejection().map(Rejection::as_str), Some("rate_limited"));
        assert_eq!(ledger.pending_count(), 5);

        // Other identities are unaffected
        let other = ledger
            .admit_submission(TestSigner::from_seed(2).request("hi"))
            .await
            .unwrap();
        assert!(other.is_accepted());
    }

    #[tokio::test]
    async fn test_admission_emits_event() {
        let ledger = ledger();
        let mut events = ledger.subscribe();
        let signer = TestSigner::from_seed(1);

        let id = ledger
            .admit_submission(signer.request("evented"))
            .await
            .unwrap()
            .id()
            .unwrap();

        match events.recv().await.unwrap() {
            LedgerEvent::SubmissionAdmitted(s) => assert_eq!(s.id, id),
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = LedgerConfig {
            block_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            Ledger::new(MemoryStore::new(), config),
            Err(LedgerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_inclusion_proof_lifecycle() {
        let ledger = ledger();
        let signer = TestSigner::from_seed(1);

        let mut ids = Vec::new();
        for content in ["a", "b", "c"] {
            let admission = ledger.admit_submission(signer.request(content)).await.unwrap();
            ids.push(admission.id().unwrap());
        }

        assert_eq!(ledger.inclusion_proof(&ids[2]).await.unwrap(), None);

        let sealed = ledger.seal_now().await.unwrap().unwrap();
        for (index, id) in ids.iter().enumerate() {
            let proof = ledger.inclusion_proof(id).await.unwrap().unwrap();
            assert_eq!(proof.block_number, 1);
            assert_eq!(proof.index, index);
            assert_eq!(proof.merkle_root, sealed.block.merkle_root);
            assert!(proof.verify());
        }

        let unknown = SubmissionId::from_bytes([9; 32]);
        assert!(matches!(
            ledger.inclusion_proof(&unknown).await,
            Err(LedgerError::SubmissionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_chain() {
        let ledger = ledger();
        let signer = TestSigner::from_seed(1);

        assert_eq!(ledger.verify_chain().await.unwrap(), 0);

        ledger.admit_submission(signer.request("one")).await.unwrap();
        ledger.seal_now().await.unwrap();
        ledger.seal_now().await.unwrap();
        ledger.admit_submission(signer.request("two")).await.unwrap();
        ledger.seal_now().await.unwrap();

        assert_eq!(ledger.verify_chain().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_anchor_record_without_anchor() {
        let ledger = ledger();
        ledger.seal_now().await.unwrap();
        assert!(ledger.anchor_record(1).await.unwrap().is_none());
    }
}
