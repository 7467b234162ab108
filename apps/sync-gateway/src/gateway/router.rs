//! Inbound frame dispatch: decode, then apply to the subscription registry.

use super::connection::ConnectionHandle;
use super::events::ClientEvent;
use super::registry::SubscriptionRegistry;

/// What a single inbound frame did to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// `added` is false when the connection was already subscribed.
    Subscribed { video_id: String, added: bool },
    /// `removed` is false when the connection was not subscribed.
    Unsubscribed { video_id: String, removed: bool },
    /// The frame was malformed or of an unknown type. No state changed.
    Ignored,
}

/// Decode `frame` from `conn` and apply it. Never fails; bad frames are
/// logged and dropped without affecting the connection.
pub fn route_frame(
    registry: &SubscriptionRegistry,
    conn: &ConnectionHandle,
    frame: &[u8],
) -> RouteOutcome {
    let event = match ClientEvent::decode(frame) {
        Ok(event) => event,
        Err(err) if err.is_forward_compatible() => {
            tracing::warn!(connection_id = %conn.id(), %err, "ignoring unknown message type");
            return RouteOutcome::Ignored;
        }
        Err(err) => {
            tracing::warn!(connection_id = %conn.id(), %err, "failed to process message");
            return RouteOutcome::Ignored;
        }
    };

    match event {
        ClientEvent::Subscribe { video_id } => {
            let added = registry.subscribe(conn, &video_id);
            tracing::info!(connection_id = %conn.id(), %video_id, added, "client subscribed to video");
            RouteOutcome::Subscribed { video_id, added }
        }
        ClientEvent::Unsubscribe { video_id } => {
            let removed = registry.unsubscribe(conn.id(), &video_id);
            tracing::info!(connection_id = %conn.id(), %video_id, removed, "client unsubscribed from video");
            RouteOutcome::Unsubscribed { video_id, removed }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SubscriptionRegistry, ConnectionHandle) {
        (SubscriptionRegistry::new(), ConnectionHandle::new(4).0)
    }

    #[test]
    fn subscribe_and_unsubscribe_frames_mutate_registry() {
        let (registry, a) = setup();

        let outcome = route_frame(&registry, &a, br#"{"type":"video:subscribe","video_id":"vid-42"}"#);
        assert_eq!(
            outcome,
            RouteOutcome::Subscribed {
                video_id: "vid-42".into(),
                added: true
            }
        );
        assert!(registry.is_subscribed(a.id(), "vid-42"));

        let outcome = route_frame(&registry, &a, br#"{"type":"video:subscribe","video_id":"vid-42"}"#);
        assert_eq!(
            outcome,
            RouteOutcome::Subscribed {
                video_id: "vid-42".into(),
                added: false
            }
        );
        assert_eq!(registry.subscriber_count("vid-42"), 1);

        let outcome =
            route_frame(&registry, &a, br#"{"type":"video:unsubscribe","video_id":"vid-42"}"#);
        assert_eq!(
            outcome,
            RouteOutcome::Unsubscribed {
                video_id: "vid-42".into(),
                removed: true
            }
        );
        assert!(!registry.is_subscribed(a.id(), "vid-42"));
    }

    #[test]
    fn malformed_frame_changes_nothing() {
        let (registry, a) = setup();
        registry.subscribe(&a, "v");

        assert_eq!(route_frame(&registry, &a, b"not json at all"), RouteOutcome::Ignored);
        assert_eq!(route_frame(&registry, &a, &[0xff, 0xfe, 0x00]), RouteOutcome::Ignored);
        assert_eq!(
            route_frame(&registry, &a, br#"{"type":"video:subscribe"}"#),
            RouteOutcome::Ignored
        );

        assert_eq!(registry.subscriptions_of(a.id()), vec!["v".to_string()]);
        assert!(a.is_open());

        // Still usable afterwards.
        assert!(matches!(
            route_frame(&registry, &a, br#"{"type":"video:subscribe","video_id":"w"}"#),
            RouteOutcome::Subscribed { added: true, .. }
        ));
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let (registry, a) = setup();
        assert_eq!(
            route_frame(&registry, &a, br#"{"type":"chat:message","video_id":"v"}"#),
            RouteOutcome::Ignored
        );
        assert_eq!(registry.video_count(), 0);
    }
}
