//! Per-connection handle: identity, liveness state, and the outbound queue.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use vidsync_common::id::{prefix, PrefixedId};

use crate::error::DeliveryError;

/// Unique connection identifier (`conn_` prefixed ULID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl PrefixedId for ConnectionId {
    const PREFIX: &'static str = prefix::CONNECTION;
}

impl ConnectionId {
    pub fn new() -> Self {
        let id = Self::generate();
        debug_assert!(Self::is_valid(&id), "malformed connection id {id}");
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Liveness of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A frame queued for the connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A serialized JSON event, shared between all recipients of a broadcast.
    Text(Utf8Bytes),
    Ping,
    Close { code: u16, reason: &'static str },
}

/// Cloneable, non-owning reference to a live connection.
///
/// The transport owns the socket; the registry and broadcaster only hold
/// handles, which can enqueue frames but never block on the socket.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    state: Arc<AtomicU8>,
    outbound: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiving end its writer task drains.
    pub fn new(outbound_buffer: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(outbound_buffer.max(1));
        let handle = Self {
            id: ConnectionId::new(),
            state: Arc::new(AtomicU8::new(ConnectionState::Open as u8)),
            outbound,
        };
        (handle, rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// `Open → Closing`. Returns false if the connection was not open.
    pub(crate) fn mark_closing(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed`. Returns true only for the call that performed the
    /// transition.
    pub(crate) fn mark_closed(&self) -> bool {
        self.state.swap(ConnectionState::Closed as u8, Ordering::AcqRel)
            != ConnectionState::Closed as u8
    }

    /// Enqueue an event frame without waiting. Fails if the connection is
    /// not open, its queue is full, or its writer has gone away.
    pub fn deliver(&self, frame: Outbound) -> Result<(), DeliveryError> {
        if !self.is_open() {
            return Err(DeliveryError::NotOpen(self.state()));
        }
        self.enqueue(frame)
    }

    /// Enqueue a control frame (ping/close) regardless of liveness state.
    pub(crate) fn enqueue(&self, frame: Outbound) -> Result<(), DeliveryError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
