//! Real-time playback sync gateway.
//!
//! Clients open a WebSocket, subscribe to video ids, and receive
//! `video:timestamp_updated` events published for those videos.

pub mod broadcast;
pub mod connection;
pub mod events;
pub mod lifecycle;
pub mod publisher;
pub mod registry;
pub mod router;
pub mod server;
pub mod tracker;
