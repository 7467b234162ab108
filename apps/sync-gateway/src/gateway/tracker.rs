//! Every live gateway connection, subscribed or not, for shutdown.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::{self, Instant};

use super::connection::{ConnectionHandle, ConnectionId, Outbound};

/// Live connections keyed by id. Entries are added when a socket is
/// accepted and removed once its writer has finished.
pub struct ConnectionTracker {
    live: DashMap<ConnectionId, ConnectionHandle>,
    idle: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            live: DashMap::new(),
            idle: Notify::new(),
        }
    }

    pub fn register(&self, handle: &ConnectionHandle) {
        self.live.insert(handle.id().clone(), handle.clone());
    }

    pub fn deregister(&self, conn_id: &ConnectionId) {
        self.live.remove(conn_id);
        if self.live.is_empty() {
            self.idle.notify_waiters();
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Stop broadcasts to every live connection and queue a close frame.
    /// Returns the number of connections asked to close.
    pub fn close_all(&self, code: u16, reason: &'static str) -> usize {
        let handles: Vec<ConnectionHandle> = self.live.iter().map(|e| e.value().clone()).collect();
        for conn in &handles {
            conn.mark_closing();
            if let Err(err) = conn.enqueue(Outbound::Close { code, reason }) {
                tracing::debug!(connection_id = %conn.id(), %err, "could not queue close frame");
            }
        }
        handles.len()
    }

    /// Wait until every tracked connection has finished, or `timeout`
    /// passes. Returns true if none are left.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            if self.live.is_empty() {
                return true;
            }
            if time::timeout_at(deadline, notified).await.is_err() {
                return self.live.is_empty();
            }
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}
