//! # Confession Ledger Testkit
//!
//! Testing utilities for the confession ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Known-answer vectors**: Keccak-256, address derivation and
//!   `personal_sign` recovery checked against published Ethereum values
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Deterministic signers and pre-filled stores
//!
//! ## Known-Answer Vectors
//!
//! ```rust
//! use confession_ledger_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, got) in verify_all_vectors() {
//!     println!("{name}: {ok} ({got})");
//! }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use confession_ledger_testkit::generators::{submission_from_params, SubmissionParams};
//!
//! proptest! {
//!     #[test]
//!     fn submission_id_is_deterministic(params: SubmissionParams) {
//!         let s1 = submission_from_params(&params);
//!         let s2 = submission_from_params(&params);
//!         prop_assert_eq!(s1.id, s2.id);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use confession_ledger_testkit::fixtures::TestSigner;
//!
//! let signer = TestSigner::from_seed(1);
//! let request = signer.request("i still have your sweater");
//! assert_eq!(request.identity, signer.identity().to_hex());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{memory_anchor, multi_party_signers, TestFixture, TestSigner};
pub use generators::{submission_from_params, SubmissionParams};
pub use vectors::{verify_all_vectors, AddressVector, HashVector, SignatureVector};
