//! # Confession Ledger Store
//!
//! The persistence port of the confession ledger. Provides a trait-based
//! interface for submission and block persistence with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! The store module abstracts ledger storage behind the [`Store`] trait,
//! allowing the ledger to be storage-agnostic. The durable implementation
//! is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests, with fault injection
//! - [`InsertResult`] - Result of inserting a submission
//!
//! ## Usage
//!
//! ```rust,no_run
//! use confession_ledger_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("ledger.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let head = store.chain_head().await.unwrap();
//!     let pending = store.pending_submissions(Some(100)).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: Inserting the same submission twice returns `AlreadyExists`
//! - **Arrival order**: Pending reads are oldest first
//! - **Atomic seals**: `commit_block` writes the block and seals its submissions, or nothing
//! - **Head CAS**: A block that does not extend the current head is a `Conflict`

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store, StoreExt};
