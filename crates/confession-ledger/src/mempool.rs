//! The mempool: admitted submissions waiting for a block.
//!
//! Every submission gets an arrival ticket when appended. Pending entries
//! are kept ordered by ticket, and a [`Snapshot`] remembers the tickets of
//! what it took, so [`Mempool::restore`] puts submissions back exactly
//! where they were, ahead of anything that arrived in the meantime.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use confession_ledger_core::{Submission, SubmissionId};

#[derive(Default)]
struct MempoolInner {
    pending: BTreeMap<u64, Submission>,
    tickets: HashMap<SubmissionId, u64>,
    next_ticket: u64,
}

/// Pending submissions in arrival order.
#[derive(Default)]
pub struct Mempool {
    inner: Mutex<MempoolInner>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a submission at the back.
    ///
    /// Returns `false` (and changes nothing) if the id is already pending.
    pub fn append(&self, submission: Submission) -> bool {
        let mut inner = self.lock();
        if inner.tickets.contains_key(&submission.id) {
            return false;
        }

        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        inner.tickets.insert(submission.id, ticket);
        inner.pending.insert(ticket, submission);
        true
    }

    /// Take up to `limit` of the oldest submissions in one step.
    ///
    /// Whatever is taken is invisible to every other caller until it is
    /// restored.
    pub fn snapshot_and_remove(&self, limit: usize) -> Snapshot {
        let mut inner = self.lock();
        let mut entries = Vec::with_capacity(limit.min(inner.pending.len()));

        while entries.len() < limit {
            let Some((ticket, submission)) = inner.pending.pop_first() else {
                break;
            };
            inner.tickets.remove(&submission.id);
            entries.push((ticket, submission));
        }

        Snapshot { entries }
    }

    /// Put a snapshot back at its original position.
    ///
    /// Entries whose id was appended again in the meantime are skipped.
    pub fn restore(&self, snapshot: Snapshot) {
        let mut inner = self.lock();
        for (ticket, submission) in snapshot.entries {
            if inner.tickets.contains_key(&submission.id) {
                continue;
            }
            inner.tickets.insert(submission.id, ticket);
            inner.pending.insert(ticket, submission);
        }
    }

    pub fn contains(&self, id: &SubmissionId) -> bool {
        self.lock().tickets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Pending ids, oldest first.
    pub fn ids(&self) -> Vec<SubmissionId> {
        self.lock().pending.values().map(|s| s.id).collect()
    }

    fn lock(&self) -> MutexGuard<'_, MempoolInner> {
        // No operation panics between paired map updates.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Mempool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mempool")
            .field("pending", &self.len())
            .finish()
    }
}

/// Submissions taken out of the mempool, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<(u64, Submission)>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<SubmissionId> {
        self.entries.iter().map(|(_, s)| s.id).collect()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.entries.iter().map(|(_, s)| s.clone()).collect()
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&Submission) -> bool) {
        self.entries.retain(|(_, s)| keep(s));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Submission> {
        self.entries.iter().map(|(_, s)| s)
    }
}
