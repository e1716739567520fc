//! Outbound events for a realtime/distribution layer.

use confession_ledger_core::{SealedBlock, Submission};
use tokio::sync::broadcast;

/// Something that happened to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A submission was accepted into the mempool.
    SubmissionAdmitted(Submission),
    /// A block was committed, with its submissions in block order.
    BlockSealed(SealedBlock),
}

impl LedgerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::SubmissionAdmitted(_) => "submission:admitted",
            LedgerEvent::BlockSealed(_) => "block:sealed",
        }
    }
}

/// Fan-out of [`LedgerEvent`]s to any number of subscribers.
///
/// Publishing never blocks. A subscriber that falls more than `capacity`
/// events behind sees `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers. Returns how many received it.
    pub fn publish(&self, event: LedgerEvent) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!(event = name, "no subscribers");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
