//! Correlation registry: pending calls keyed by call id.
//!
//! The registry is the only shared mutable state in the RPC engine. Each
//! pending call is a single-assignment slot: it is created at call time,
//! fulfilled exactly once (matching reply or timeout), and removed
//! immediately after resolution. Resolution removes-then-sends, so whichever
//! of reply and timeout arrives first wins and the loser observes a no-op.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sift_types::{CallId, ReplyEnvelope};
use tokio::sync::oneshot;

/// Thread-safe map from call id to the pending call's result slot.
#[derive(Default)]
pub struct CorrelationRegistry {
    pending: DashMap<CallId, oneshot::Sender<ReplyEnvelope>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending call and return the receiving half of its result
    /// slot. Returns `None` when the id is already pending: at most one
    /// pending call may exist per id.
    pub fn register(&self, call_id: CallId) -> Option<oneshot::Receiver<ReplyEnvelope>> {
        match self.pending.entry(call_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let (result_tx, result_rx) = oneshot::channel();
                slot.insert(result_tx);
                Some(result_rx)
            }
        }
    }

    /// Resolve the pending call matching the reply, if any. Returns whether
    /// a waiting caller received the reply; `false` means the id was unknown
    /// or already resolved and the reply should be dropped.
    pub fn resolve(&self, reply: ReplyEnvelope) -> bool {
        match self.pending.remove(&reply.call_id) {
            Some((_, result_tx)) => result_tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Remove a pending call without fulfilling it (timeout or caller
    /// cancellation). A reply arriving afterwards resolves nothing.
    pub fn cancel(&self, call_id: &CallId) -> bool {
        self.pending.remove(call_id).is_some()
    }

    /// Number of calls currently in flight.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }
}
