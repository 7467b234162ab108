//! Wire-format envelopes exchanged over the gateway socket.
//!
//! Every frame is a JSON object tagged by its `type` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Envelope `type` values understood by the gateway.
pub struct EventKind;

impl EventKind {
    pub const VIDEO_SUBSCRIBE: &'static str = "video:subscribe";
    pub const VIDEO_UNSUBSCRIBE: &'static str = "video:unsubscribe";
    pub const VIDEO_TIMESTAMP_UPDATED: &'static str = "video:timestamp_updated";
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// An inbound envelope before its kind-specific fields are checked.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct VideoPayload {
    #[serde(default)]
    video_id: Option<String>,
}

/// A validated message received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Subscribe { video_id: String },
    Unsubscribe { video_id: String },
}

impl ClientEvent {
    /// Decode a raw frame (JSON text or bytes) into a known client event.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let envelope: RawEnvelope = serde_json::from_slice(frame)?;

        match envelope.kind.as_str() {
            EventKind::VIDEO_SUBSCRIBE => {
                let video_id = video_id(EventKind::VIDEO_SUBSCRIBE, envelope.fields)?;
                Ok(Self::Subscribe { video_id })
            }
            EventKind::VIDEO_UNSUBSCRIBE => {
                let video_id = video_id(EventKind::VIDEO_UNSUBSCRIBE, envelope.fields)?;
                Ok(Self::Unsubscribe { video_id })
            }
            _ => Err(DecodeError::UnknownKind(envelope.kind)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => EventKind::VIDEO_SUBSCRIBE,
            Self::Unsubscribe { .. } => EventKind::VIDEO_UNSUBSCRIBE,
        }
    }
}

fn video_id(kind: &'static str, fields: Map<String, Value>) -> Result<String, DecodeError> {
    let payload: VideoPayload = serde_json::from_value(Value::Object(fields))
        .map_err(|source| DecodeError::InvalidPayload { kind, source })?;

    payload
        .video_id
        .filter(|id| !id.is_empty())
        .ok_or(DecodeError::MissingVideoId { kind })
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// An event pushed from the server to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "video:timestamp_updated")]
    TimestampUpdated { timestamp: f64, user_id: String },
}
