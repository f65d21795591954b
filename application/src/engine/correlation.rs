//! Outbound request correlation.
//!
//! The engine occasionally initiates its own requests (operator
//! confirmation, planning). Each gets a fresh id and a oneshot waiter;
//! inbound responses are matched back here. A response to an id no one is
//! waiting on is logged and dropped rather than surfaced.

use robolink_domain::{Request, RequestId, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

/// Tracks requests the engine has sent and is awaiting responses for.
#[derive(Default)]
pub struct OutboundRequests {
    next_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Response>>>,
}

impl OutboundRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id and register a waiter for its response.
    pub fn register(
        &self,
        method: &str,
        params: Value,
    ) -> (Request, oneshot::Receiver<Response>) {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("correlation lock poisoned")
            .insert(id.clone(), tx);
        (Request::new(id, method, params), rx)
    }

    /// Route an inbound response to its waiter. Returns `false` when no
    /// one is waiting (late or unsolicited response).
    pub fn resolve(&self, response: Response) -> bool {
        let waiter = self
            .pending
            .lock()
            .expect("correlation lock poisoned")
            .remove(&response.id);
        match waiter {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                debug!(id = %response.id, "Dropping response with no pending request");
                false
            }
        }
    }

    /// Forget a pending request (e.g. after a local timeout) so a late
    /// response is treated as unsolicited.
    pub fn forget(&self, id: &RequestId) {
        self.pending
            .lock()
            .expect("correlation lock poisoned")
            .remove(id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .expect("correlation lock poisoned")
            .len()
    }
}
