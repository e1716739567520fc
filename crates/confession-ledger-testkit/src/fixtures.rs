//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;
use std::time::Duration;

use confession_ledger_anchor::{AnchorClient, MemoryAnchor};
use confession_ledger_core::{
    now_millis, Identity, KeccakHash, Keypair, RecoverableSignature, Submission,
    SubmissionRequest,
};
use confession_ledger_store::{MemoryStore, Store};

/// A submitter with a deterministic or random secp256k1 key.
#[derive(Debug, Clone)]
pub struct TestSigner {
    pub keypair: Keypair,
}

impl TestSigner {
    /// Create a signer with a random keypair.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
        }
    }

    /// Create a deterministic signer; equal seeds give equal identities.
    pub fn from_seed(seed: u8) -> Self {
        let secret = KeccakHash::hash_parts(&[b"confession-testkit-signer", &[seed]]);
        Self {
            keypair: Keypair::from_secret(secret.as_bytes())
                .expect("keccak output is a valid secp256k1 scalar"),
        }
    }

    pub fn identity(&self) -> Identity {
        self.keypair.identity()
    }

    /// `personal_sign` over the content bytes.
    pub fn sign(&self, content: &str) -> RecoverableSignature {
        self.keypair
            .sign(content.as_bytes())
            .expect("signing with a valid key succeeds")
    }

    /// A correctly signed request without a category.
    pub fn request(&self, content: &str) -> SubmissionRequest {
        SubmissionRequest::new(
            content,
            self.sign(content).to_hex(),
            self.identity().to_hex(),
            None,
        )
    }

    /// A correctly signed request with a category.
    pub fn request_with_category(&self, content: &str, category: &str) -> SubmissionRequest {
        SubmissionRequest {
            category: Some(category.to_string()),
            ..self.request(content)
        }
    }

    /// A pending submission as admission would build it.
    pub fn submission(&self, content: &str, created_at: i64) -> Submission {
        Submission::new(
            self.identity(),
            content.to_string(),
            self.sign(content),
            None,
            created_at,
        )
    }
}

impl Default for TestSigner {
    fn default() -> Self {
        Self::new()
    }
}

/// A test fixture with a signer and memory store.
pub struct TestFixture {
    pub signer: TestSigner,
    pub store: MemoryStore,
}

impl TestFixture {
    /// Create a new test fixture with a random signer.
    pub fn new() -> Self {
        Self {
            signer: TestSigner::new(),
            store: MemoryStore::new(),
        }
    }

    /// Create with a deterministic signer.
    pub fn with_seed(seed: u8) -> Self {
        Self {
            signer: TestSigner::from_seed(seed),
            store: MemoryStore::new(),
        }
    }

    /// Insert `count` pending submissions directly into the store.
    ///
    /// Returned in arrival order.
    pub async fn insert_pending(&self, count: usize) -> Vec<Submission> {
        let base = now_millis();
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let submission = self
                .signer
                .submission(&format!("pending submission {i}"), base + i as i64);
            self.store
                .insert_submission(&submission)
                .await
                .expect("memory store insert");
            out.push(submission);
        }
        out
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple deterministic signers for multi-party tests.
pub fn multi_party_signers(count: usize) -> Vec<TestSigner> {
    (0..count).map(|i| TestSigner::from_seed(i as u8)).collect()
}

/// A [`MemoryAnchor`] and a client bound to it.
pub fn memory_anchor(timeout: Duration) -> (Arc<MemoryAnchor>, AnchorClient) {
    let anchor = Arc::new(MemoryAnchor::new());
    let client = AnchorClient::new(anchor.clone(), timeout);
    (anchor, client)
}
