//! Optional, timeout-bounded access to an external ledger.
//!
//! [`AnchorClient::publish`] returns `Option<AnchorRef>`: `None` covers
//! "no anchor configured", timeouts and errors alike, all of which the
//! caller ignores. Errors are logged here and go no further.

use std::sync::Arc;
use std::time::Duration;

use confession_ledger_core::{AnchorRef, BlockCommitment};

use crate::anchor::{AnchorRecord, ChainAnchor};
use crate::error::{AnchorError, Result};

/// Default bound on a single publish call.
pub const DEFAULT_ANCHOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Wrapper around an optional [`ChainAnchor`].
#[derive(Clone)]
pub struct AnchorClient {
    anchor: Option<Arc<dyn ChainAnchor>>,
    timeout: Duration,
}

impl AnchorClient {
    pub fn new(anchor: Arc<dyn ChainAnchor>, timeout: Duration) -> Self {
        Self {
            anchor: Some(anchor),
            timeout,
        }
    }

    /// A client with no external ledger; every publish is a no-op.
    pub fn disabled() -> Self {
        Self {
            anchor: None,
            timeout: DEFAULT_ANCHOR_TIMEOUT,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Publish a commitment, best effort.
    pub async fn publish(&self, commitment: &BlockCommitment) -> Option<AnchorRef> {
        let anchor = self.anchor.as_ref()?;

        match tokio::time::timeout(self.timeout, anchor.publish(commitment)).await {
            Ok(Ok(reference)) => {
                tracing::debug!(
                    block = commitment.number,
                    anchor = anchor.name(),
                    reference = %reference.reference,
                    "block anchored"
                );
                Some(reference)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    block = commitment.number,
                    anchor = anchor.name(),
                    error = %e,
                    "anchor publish failed"
                );
                None
            }
            Err(_) => {
                let e = AnchorError::Timeout(self.timeout);
                tracing::warn!(
                    block = commitment.number,
                    anchor = anchor.name(),
                    error = %e,
                    "anchor publish failed"
                );
                None
            }
        }
    }

    /// Pass-through lookup on the external ledger.
    ///
    /// `Ok(None)` when no anchor is configured or nothing is recorded yet.
    pub async fn read(&self, number: u64) -> Result<Option<AnchorRecord>> {
        let Some(anchor) = self.anchor.as_ref() else {
            return Ok(None);
        };

        tokio::time::timeout(self.timeout, anchor.read(number))
            .await
            .map_err(|_| AnchorError::Timeout(self.timeout))?
    }
}

impl Default for AnchorClient {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for AnchorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorClient")
            .field("anchor", &self.anchor.as_ref().map(|a| a.name()))
            .field("timeout", &self.timeout)
            .finish()
    }
}
