//! Error types for the gateway core.
//!
//! None of these are fatal: callers log them and carry on with the next
//! message or the next subscriber.

use crate::gateway::connection::ConnectionState;

/// An inbound frame that could not be turned into a known client event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not a well-formed JSON envelope with a string `type`.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Well-formed envelope with a `type` this server does not handle.
    #[error("unknown message type `{0}`")]
    UnknownKind(String),

    /// A video event without a usable `video_id`.
    #[error("`{kind}` requires a non-empty video_id")]
    MissingVideoId { kind: &'static str },

    /// A known `type` whose fields have the wrong shape.
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Unknown kinds are expected from newer clients; everything else is a
    /// client bug.
    pub fn is_forward_compatible(&self) -> bool {
        matches!(self, Self::UnknownKind(_))
    }
}

/// Failure to hand a frame to one connection's writer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection is {0:?}")]
    NotOpen(ConnectionState),

    #[error("outbound queue is full")]
    QueueFull,

    #[error("connection writer has shut down")]
    Disconnected,
}
