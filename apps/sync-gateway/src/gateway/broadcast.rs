//! Broadcast engine: fans one event out to every subscriber of a video.
//!
//! Delivery only enqueues onto each connection's bounded outbound queue, so
//! a slow or dead subscriber never holds up the others. Missed events are
//! not retried.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;

use super::connection::Outbound;
use super::events::ServerEvent;
use super::registry::SubscriptionRegistry;

/// Outcome of a single broadcast call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers found when the broadcast started.
    pub subscribers: usize,
    pub delivered: usize,
    /// Subscribers skipped because they were closing, closed, or backed up.
    pub dropped: usize,
}

/// Cloneable broadcast hub. Store in AppState.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriptionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to every current subscriber of `video_id`.
    ///
    /// Never fails: per-subscriber errors are logged and counted.
    pub fn broadcast(&self, video_id: &str, event: &ServerEvent) -> BroadcastReport {
        let frame: Utf8Bytes = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(err) => {
                tracing::warn!(?err, %video_id, "failed to serialize broadcast event");
                return BroadcastReport::default();
            }
        };

        let subscribers = self.registry.subscribers_of(video_id);
        let mut report = BroadcastReport {
            subscribers: subscribers.len(),
            ..BroadcastReport::default()
        };

        for conn in &subscribers {
            match conn.deliver(Outbound::Text(frame.clone())) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.dropped += 1;
                    tracing::debug!(
                        connection_id = %conn.id(),
                        %video_id,
                        %err,
                        "skipped subscriber during broadcast"
                    );
                }
            }
        }

        tracing::trace!(
            %video_id,
            subscribers = report.subscribers,
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast complete"
        );
        report
    }
}
