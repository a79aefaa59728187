//! Response table: decoded payloads keyed by invoke id.

use dashmap::DashMap;
use dmcc_protocol::InvokeId;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Concurrent store of responses, written by the receive loop and read by callers.
///
/// Each client owns its own table. Lookups never block on writers beyond a
/// shard lock held for the duration of a single insert.
#[derive(Debug, Default)]
pub struct ResponseTable {
    entries: DashMap<InvokeId, String>,
    arrivals: Notify,
}

impl ResponseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the payload for `id` and wakes waiting readers.
    pub fn put(&self, id: InvokeId, payload: String) {
        if self.entries.insert(id, payload).is_some() {
            tracing::debug!("Overwrote stale response for invoke_id={}", id);
        }
        self.arrivals.notify_waiters();
    }

    /// Returns a copy of the payload for `id`, if present.
    pub fn get(&self, id: &InvokeId) -> Option<String> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &InvokeId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry. Called at client teardown.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Future completing on the next `put`.
    ///
    /// Call `enable` on the pinned future before checking the table to avoid
    /// missing a put that lands in between.
    pub fn notified(&self) -> Notified<'_> {
        self.arrivals.notified()
    }
}
