//! # Confession Ledger
//!
//! The unified API for the confession ledger engine: signed, rate-limited
//! admission of submissions and their periodic sealing into a hash-chained
//! sequence of blocks.
//!
//! ## Overview
//!
//! - **Admission**: a submission is accepted only if its signature recovers
//!   to the identity the caller claims and that identity is within quota
//! - **Mempool**: accepted submissions wait in arrival order
//! - **Sealing**: on a timer or on demand, the oldest pending submissions
//!   become the next block, committed to the store in one atomic step
//! - **Anchoring**: optionally, each block's `{number, merkle_root, count}`
//!   is published to an external ledger, best effort
//!
//! ## Key Concepts
//!
//! - **Single flight**: at most one seal runs at a time; block numbers never
//!   skip or repeat
//! - **Exactly once**: a failed seal returns its submissions to the mempool
//!   in their original order
//! - **Two commitments**: every block carries an integrity hash over its
//!   full contents and a Merkle root that supports inclusion proofs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use confession_ledger::{Admission, Ledger, LedgerConfig};
//! use confession_ledger::core::SubmissionRequest;
//! use confession_ledger::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("ledger.db").unwrap();
//!     let ledger = Ledger::new(store, LedgerConfig::default()).unwrap();
//!     ledger.recover().await.unwrap();
//!
//!     let request = SubmissionRequest::new("i lied about liking jazz", "0x…", "0x…", None);
//!     match ledger.admit_submission(request).await.unwrap() {
//!         Admission::Accepted { id, remaining_quota } => println!("{id} ({remaining_quota} left)"),
//!         Admission::Rejected(reason) => println!("rejected: {}", reason.as_str()),
//!     }
//!
//!     let block = ledger.seal_now().await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `confession_ledger::core` - Core primitives (Submission, Block, MerkleTree, etc.)
//! - `confession_ledger::store` - Storage abstraction and SQLite
//! - `confession_ledger::anchor` - External ledger port

pub mod admission;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod mempool;
pub mod sealer;

// Re-export component crates
pub use confession_ledger_anchor as anchor;
pub use confession_ledger_core as core;
pub use confession_ledger_store as store;

// Re-export main types for convenience
pub use admission::{Admission, AdmissionController, Quota, Rejection};
pub use config::{LedgerConfig, RateLimitConfig};
pub use error::{ConfigError, LedgerError, Result};
pub use events::{EventBus, LedgerEvent};
pub use ledger::{InclusionProof, Ledger};
pub use mempool::{Mempool, Snapshot};
pub use sealer::{BlockSealer, SealerState, SealerStatus};

// Re-export commonly used core types
pub use confession_ledger_core::{
    Block, Identity, KeccakHash, SealedBlock, Submission, SubmissionId, SubmissionRequest,
};
