//! Per-channel pending-call bookkeeping.
//!
//! Every outstanding request on a channel is one entry in a [`CallTable`]:
//! correlation id → the oneshot that completes the caller's future. Entries
//! are registered **before** the request frame is sent so a response racing
//! the send can never be missed, and removed on response, timeout, or
//! channel loss — the table never leaks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;

use lattice_core::error::RpcError;
use lattice_core::protocol::CallId;

/// Outcome delivered to a waiting caller.
pub type CallOutcome = Result<Value, RpcError>;

/// Correlation-id table for one direction of one channel.
///
/// Ids are minted from a monotonically increasing counter, which keeps every
/// outstanding request on the channel distinct.
pub struct CallTable {
    pending: Mutex<HashMap<CallId, oneshot::Sender<CallOutcome>>>,
    next_id: AtomicU64,
}

impl CallTable {
    /// Creates an empty table. Ids start at 1.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Mints a fresh correlation id and registers a pending entry for it.
    ///
    /// The returned receiver completes when [`resolve`](Self::resolve) is
    /// called with the same id, or errs if the table is cleared.
    pub fn register(&self) -> (CallId, oneshot::Receiver<CallOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (id, rx)
    }

    /// Completes the pending entry for `id`, if any.
    ///
    /// Returns `false` when no entry is waiting — the caller most likely
    /// timed out already; such responses are dropped.
    pub fn resolve(&self, id: CallId, outcome: CallOutcome) -> bool {
        match self.pending.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => {
                warn!(id, "Response for unknown correlation id (timed out?) — dropped");
                false
            }
        }
    }

    /// Removes the entry for `id` without completing it. Used on timeout
    /// expiry and on send failure, so the entry doesn't dangle.
    pub fn remove(&self, id: CallId) {
        self.pending.lock().remove(&id);
    }

    /// Fails every outstanding call with clones of `error`.
    ///
    /// Called when the channel is lost; afterwards the table is empty.
    pub fn fail_all(&self, error: RpcError) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no calls are outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Default for CallTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn register_and_resolve_round_trip() {
        let table = CallTable::new();
        let (id, rx) = table.register();
        assert!(table.resolve(id, Ok(json!(42))));
        assert_eq!(rx.await.unwrap().unwrap(), json!(42));
        assert!(table.is_empty());
    }

    #[test]
    fn resolve_unknown_id_is_dropped() {
        let table = CallTable::new();
        assert!(!table.resolve(999, Ok(json!(null))));
    }

    #[test]
    fn ids_are_distinct() {
        let table = CallTable::new();
        let (a, _rx_a) = table.register();
        let (b, _rx_b) = table.register();
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn fail_all_rejects_every_waiter() {
        let table = CallTable::new();
        let (_a, rx_a) = table.register();
        let (_b, rx_b) = table.register();
        table.fail_all(RpcError::WorkerGone);
        assert!(matches!(rx_a.await.unwrap(), Err(RpcError::WorkerGone)));
        assert!(matches!(rx_b.await.unwrap(), Err(RpcError::WorkerGone)));
        assert!(table.is_empty());
    }

    #[test]
    fn remove_clears_entry() {
        let table = CallTable::new();
        let (id, _rx) = table.register();
        table.remove(id);
        assert!(table.is_empty());
    }
}
