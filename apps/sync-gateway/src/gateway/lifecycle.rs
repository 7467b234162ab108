//! Connection lifecycle: detects the terminal transition and performs the
//! one-time registry cleanup.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::connection::{ConnectionHandle, ConnectionState};
use super::registry::SubscriptionRegistry;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame or the stream ended cleanly.
    ClientClosed,
    /// Reading from the socket failed.
    TransportError,
    /// No inbound traffic within the idle timeout.
    IdleTimeout,
    /// Writing to the socket failed.
    WriterFailed,
    /// The server sent a going-away close frame while shutting down.
    ServerShutdown,
    /// The lifecycle was dropped without an explicit close.
    Dropped,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::IdleTimeout => "idle_timeout",
            Self::WriterFailed => "writer_failed",
            Self::ServerShutdown => "server_shutdown",
            Self::Dropped => "dropped",
        };
        f.write_str(s)
    }
}

/// Owns the lifecycle of one connection: `Open → Closing → Closed`, or
/// `Open → Closed` on abrupt termination.
///
/// Closing happens exactly once, whichever terminal event is reported first.
/// Dropping an unclosed lifecycle closes it with [`CloseReason::Dropped`].
pub struct ConnectionLifecycle {
    handle: ConnectionHandle,
    registry: Arc<SubscriptionRegistry>,
    reason: Mutex<Option<CloseReason>>,
}

impl ConnectionLifecycle {
    pub fn new(handle: ConnectionHandle, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            handle,
            registry,
            reason: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// The client started a close handshake. Broadcasts stop immediately;
    /// subscriptions are released on [`close`](Self::close).
    pub fn begin_closing(&self) -> bool {
        self.handle.mark_closing()
    }

    /// Transition into `Closed` and release every subscription.
    ///
    /// Returns the number of subscriptions removed, or `None` if the
    /// connection had already been closed.
    pub fn close(&self, reason: CloseReason) -> Option<usize> {
        let mut recorded = self.reason.lock();
        if !self.handle.mark_closed() {
            return None;
        }
        *recorded = Some(reason);
        drop(recorded);

        let removed = self.registry.remove_everywhere(&self.handle);
        tracing::debug!(
            connection_id = %self.handle.id(),
            %reason,
            removed,
            "connection closed"
        );
        Some(removed)
    }

    /// The reason recorded by the first [`close`](Self::close), if any.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.reason.lock()
    }
}

impl Drop for ConnectionLifecycle {
    fn drop(&mut self) {
        self.close(CloseReason::Dropped);
    }
}
