//! In-flight request registry.
//!
//! Owns the set of pending requests for one connection: issues correlation
//! ids, tracks per-request deadlines, and guarantees each entry is completed
//! exactly once — by response, timeout, or drain.
//!
//! Exactly-once is enforced structurally: each pending entry holds a
//! `oneshot` sender that can only be consumed by removing the entry from
//! the mutex-guarded map, so a response and a firing deadline can never
//! both complete the same request. Whichever removes the entry first wins
//! and aborts the other side.
//!
//! Draining closes the registry: registrations that arrive after the
//! connection tore down complete immediately with the drain error instead
//! of pending against a connection that no longer exists. A reconnect uses
//! a fresh registry, so the closed state never carries over.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{ClientError, Result};

/// Completion handle held by the caller of `request()` until its id
/// resolves, rejects, times out, or the connection drains.
pub type CompletionReceiver = oneshot::Receiver<Result<Value>>;

/// One pending request: its completion slot and armed deadline timer.
#[derive(Debug)]
struct PendingEntry {
    /// Completion slot; consumed exactly once on removal.
    complete: oneshot::Sender<Result<Value>>,
    /// Deadline timer task; aborted when the entry completes first.
    /// `None` only for the moment between insertion and arming.
    timer: Option<JoinHandle<()>>,
    /// Method name, carried into the timeout error.
    method: String,
}

impl PendingEntry {
    fn cancel_timer(&self) {
        if let Some(timer) = &self.timer {
            timer.abort();
        }
    }
}

/// Pending map plus terminal state, guarded by one mutex so a drain and a
/// registration can never interleave.
#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<u64, PendingEntry>,
    /// Set by [`RequestRegistry::drain_all`]; once present, the registry
    /// accepts no new entries.
    closed: Option<ClientError>,
}

/// Registry of in-flight requests for a single connection.
///
/// Cheaply clonable; clones share the same id counter and pending map.
/// A fresh connection gets a fresh registry, which restarts the id space.
#[derive(Debug, Clone, Default)]
pub struct RequestRegistry {
    next_id: Arc<AtomicU64>,
    inner: Arc<Mutex<Inner>>,
}

impl RequestRegistry {
    /// Create an empty registry with the id counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh correlation id — positive, unique, monotonically
    /// increasing for the lifetime of this registry; never reused.
    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a pending request under `id` and arm its deadline timer.
    ///
    /// Returns the receiver that completes exactly once with the request's
    /// terminal outcome. If the deadline elapses while the entry is still
    /// pending it is rejected with [`ClientError::Timeout`] and removed.
    /// On a registry already drained, the receiver completes immediately
    /// with the drain error and no entry is inserted.
    pub async fn register(&self, id: u64, method: &str, timeout: Duration) -> CompletionReceiver {
        let (complete, rx) = oneshot::channel();

        {
            let mut inner = self.inner.lock().await;
            if let Some(terminal) = &inner.closed {
                debug!(id, method, "registration after drain rejected");
                complete.send(Err(terminal.clone())).ok();
                return rx;
            }

            let entry = PendingEntry {
                complete,
                timer: None,
                method: method.to_owned(),
            };
            if let Some(previous) = inner.entries.insert(id, entry) {
                // Ids are never reused within a connection; treat a collision
                // as a drained duplicate rather than leaving it pending.
                warn!(id, "duplicate pending id replaced; rejecting previous entry");
                previous.cancel_timer();
                previous
                    .complete
                    .send(Err(ClientError::ConnectionLost(
                        "pending entry replaced by duplicate id".into(),
                    )))
                    .ok();
            }
        }

        let registry = self.clone();
        let timer_method = method.to_owned();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            registry.on_timeout_fire(id, &timer_method, timeout).await;
        });

        // Arm the deadline. The entry may already be gone if it completed
        // in the meantime; the spawned timer is then aborted (and a firing
        // that slipped in finds no entry, making it a no-op either way).
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(&id) {
            Some(entry) => entry.timer = Some(timer),
            None => timer.abort(),
        }
        drop(inner);

        rx
    }

    /// Complete the pending request `id` with a success payload.
    ///
    /// If the id is unknown (late duplicate, already completed, or never
    /// registered) the call is a logged no-op.
    pub async fn resolve(&self, id: u64, result: Value) {
        match self.remove(id).await {
            Some(entry) => {
                entry.cancel_timer();
                if entry.complete.send(Ok(result)).is_err() {
                    warn!(id, "completion receiver dropped before resolve");
                }
            }
            None => {
                debug!(id, "response for unknown id dropped");
            }
        }
    }

    /// Complete the pending request `id` with an error.
    ///
    /// Unknown ids are a logged no-op, mirroring [`RequestRegistry::resolve`].
    pub async fn reject(&self, id: u64, error: ClientError) {
        match self.remove(id).await {
            Some(entry) => {
                entry.cancel_timer();
                if entry.complete.send(Err(error)).is_err() {
                    warn!(id, "completion receiver dropped before reject");
                }
            }
            None => {
                debug!(id, "rejection for unknown id dropped");
            }
        }
    }

    /// Reject every remaining entry with `error`, clear the registry, and
    /// close it against further registrations.
    ///
    /// Used on disconnect and on process failure so nothing outlives the
    /// connection still pending — including a registration racing with the
    /// teardown, which now completes immediately with the same error.
    pub async fn drain_all(&self, error: &ClientError) {
        let drained: Vec<(u64, PendingEntry)> = {
            let mut inner = self.inner.lock().await;
            inner.closed = Some(error.clone());
            inner.entries.drain().collect()
        };

        if !drained.is_empty() {
            debug!(count = drained.len(), %error, "draining pending requests");
        }

        for (id, entry) in drained {
            entry.cancel_timer();
            if entry.complete.send(Err(error.clone())).is_err() {
                debug!(id, "completion receiver dropped before drain delivery");
            }
        }
    }

    /// Number of requests currently pending.
    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Deadline handler: rejects `id` with [`ClientError::Timeout`] if the
    /// entry is still pending. A response that won the race has already
    /// removed the entry, making this a no-op.
    async fn on_timeout_fire(&self, id: u64, method: &str, after: Duration) {
        let Some(entry) = self.remove(id).await else {
            return;
        };

        debug!(id, method, ?after, "request deadline elapsed");
        if entry
            .complete
            .send(Err(ClientError::Timeout {
                method: method.to_owned(),
                after,
            }))
            .is_err()
        {
            debug!(id, "completion receiver dropped before timeout delivery");
        }
    }

    async fn remove(&self, id: u64) -> Option<PendingEntry> {
        self.inner.lock().await.entries.remove(&id)
    }
}
