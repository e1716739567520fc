//! # Confession Ledger Anchor
//!
//! Best-effort publication of block commitments to an external ledger.
//!
//! ## Overview
//!
//! After a block commits, the ledger hands `{number, merkle_root, count}` to
//! a [`ChainAnchor`]. The outcome never affects the committed block: a
//! returned [`AnchorRef`](confession_ledger_core::AnchorRef) is attached to
//! the block later, and any failure is logged and dropped.
//!
//! ## Key Types
//!
//! - [`ChainAnchor`] - The async trait an external ledger implements
//! - [`AnchorClient`] - Optional, timeout-bounded wrapper used by the sealer
//! - [`MemoryAnchor`] - In-process external ledger for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use confession_ledger_anchor::{AnchorClient, MemoryAnchor};
//!
//! let client = AnchorClient::new(Arc::new(MemoryAnchor::new()), Duration::from_secs(10));
//!
//! // Or no external ledger at all
//! let client = AnchorClient::disabled();
//! ```

pub mod anchor;
pub mod client;
pub mod error;

pub use anchor::{memory::MemoryAnchor, AnchorRecord, ChainAnchor};
pub use client::{AnchorClient, DEFAULT_ANCHOR_TIMEOUT};
pub use error::{AnchorError, Result};
