//! Subscription registry: which connections want events for which video.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

use super::connection::{ConnectionHandle, ConnectionId, ConnectionState};

/// Shared registry of video subscriptions.
///
/// Keeps two `DashMap` indexes: video → subscribed handles (read by the
/// broadcaster) and connection → videos (used for cleanup on close). Writers
/// always lock the connection entry before the video entry.
pub struct SubscriptionRegistry {
    videos: DashMap<String, HashMap<ConnectionId, ConnectionHandle>>,
    memberships: DashMap<ConnectionId, HashSet<String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            videos: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Add `conn` to the subscribers of `video_id`.
    ///
    /// Returns true if the subscription is new. A connection that has
    /// already been closed is never registered.
    pub fn subscribe(&self, conn: &ConnectionHandle, video_id: &str) -> bool {
        let mut joined = self.memberships.entry(conn.id().clone()).or_default();

        // `remove_everywhere` marks the handle closed before taking this
        // entry lock, so checking here cannot miss a concurrent close.
        if conn.state() == ConnectionState::Closed {
            let stale = joined.is_empty();
            drop(joined);
            if stale {
                self.memberships.remove_if(conn.id(), |_, videos| videos.is_empty());
            }
            return false;
        }

        let added = joined.insert(video_id.to_string());
        self.videos
            .entry(video_id.to_string())
            .or_default()
            .insert(conn.id().clone(), conn.clone());
        added
    }

    /// Remove `conn_id` from the subscribers of `video_id`.
    ///
    /// Returns true if it was subscribed.
    pub fn unsubscribe(&self, conn_id: &ConnectionId, video_id: &str) -> bool {
        let Some(mut joined) = self.memberships.get_mut(conn_id) else {
            return false;
        };
        if !joined.remove(video_id) {
            return false;
        }
        self.detach(conn_id, video_id);
        let now_empty = joined.is_empty();
        drop(joined);
        if now_empty {
            self.memberships.remove_if(conn_id, |_, videos| videos.is_empty());
        }
        true
    }

    /// Drop `conn` from every subscription set it belongs to.
    ///
    /// The handle must already be marked closed. Returns the number of
    /// subscriptions removed.
    pub fn remove_everywhere(&self, conn: &ConnectionHandle) -> usize {
        debug_assert_eq!(conn.state(), ConnectionState::Closed);

        let Some((conn_id, videos)) = self.memberships.remove(conn.id()) else {
            return 0;
        };
        for video_id in &videos {
            self.detach(&conn_id, video_id);
        }
        videos.len()
    }

    /// Snapshot of the current subscribers of `video_id`.
    ///
    /// The returned handles are owned copies, safe to iterate while the
    /// registry keeps changing.
    pub fn subscribers_of(&self, video_id: &str) -> Vec<ConnectionHandle> {
        self.videos
            .get(video_id)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, conn_id: &ConnectionId, video_id: &str) -> bool {
        self.videos
            .get(video_id)
            .is_some_and(|subs| subs.contains_key(conn_id))
    }

    pub fn subscriber_count(&self, video_id: &str) -> usize {
        self.videos.get(video_id).map_or(0, |subs| subs.len())
    }

    /// Videos `conn_id` is currently subscribed to, sorted.
    pub fn subscriptions_of(&self, conn_id: &ConnectionId) -> Vec<String> {
        let mut videos: Vec<String> = self
            .memberships
            .get(conn_id)
            .map(|joined| joined.iter().cloned().collect())
            .unwrap_or_default();
        videos.sort();
        videos
    }

    /// Number of videos with at least one subscriber.
    pub fn video_count(&self) -> usize {
        self.videos.len()
    }

    /// Number of connections with at least one subscription.
    pub fn connection_count(&self) -> usize {
        self.memberships.len()
    }

    /// Empty the registry at shutdown, returning each distinct handle once.
    pub fn drain(&self) -> Vec<ConnectionHandle> {
        let mut handles: HashMap<ConnectionId, ConnectionHandle> = HashMap::new();
        let video_ids: Vec<String> = self.videos.iter().map(|e| e.key().clone()).collect();
        for video_id in video_ids {
            if let Some((_, subs)) = self.videos.remove(&video_id) {
                handles.extend(subs);
            }
        }
        self.memberships.clear();
        handles.into_values().collect()
    }

    /// Remove one connection from one video's set, pruning the set if empty.
    fn detach(&self, conn_id: &ConnectionId, video_id: &str) {
        let now_empty = match self.videos.get_mut(video_id) {
            Some(mut subs) => {
                subs.remove(conn_id);
                subs.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.videos.remove_if(video_id, |_, subs| subs.is_empty());
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn conn() -> ConnectionHandle {
        ConnectionHandle::new(8).0
    }

    fn ids(handles: &[ConnectionHandle]) -> HashSet<ConnectionId> {
        handles.iter().map(|h| h.id().clone()).collect()
    }

    #[test]
    fn subscribe_then_unsubscribe() {
        let registry = SubscriptionRegistry::new();
        let a = conn();

        assert!(registry.subscribe(&a, "vid-42"));
        assert!(registry.is_subscribed(a.id(), "vid-42"));
        assert_eq!(ids(&registry.subscribers_of("vid-42")), HashSet::from([a.id().clone()]));

        assert!(registry.unsubscribe(a.id(), "vid-42"));
        assert!(!registry.is_subscribed(a.id(), "vid-42"));
        assert!(registry.subscribers_of("vid-42").is_empty());
    }

    #[test]
    fn subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let a = conn();

        assert!(registry.subscribe(&a, "v"));
        assert!(!registry.subscribe(&a, "v"));
        assert_eq!(registry.subscriber_count("v"), 1);
        assert_eq!(registry.subscriptions_of(a.id()), vec!["v".to_string()]);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_tolerates_unknowns() {
        let registry = SubscriptionRegistry::new();
        let a = conn();
        let b = conn();

        assert!(!registry.unsubscribe(a.id(), "never-seen"));

        registry.subscribe(&a, "v");
        registry.subscribe(&b, "v");
        assert!(registry.unsubscribe(a.id(), "v"));
        assert!(!registry.unsubscribe(a.id(), "v"));
        assert_eq!(ids(&registry.subscribers_of("v")), HashSet::from([b.id().clone()]));
    }

    #[test]
    fn empty_sets_are_pruned() {
        let registry = SubscriptionRegistry::new();
        let a = conn();

        registry.subscribe(&a, "v1");
        registry.subscribe(&a, "v2");
        assert_eq!(registry.video_count(), 2);
        assert_eq!(registry.connection_count(), 1);

        registry.unsubscribe(a.id(), "v1");
        registry.unsubscribe(a.id(), "v2");
        assert_eq!(registry.video_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn remove_everywhere_clears_every_set() {
        let registry = SubscriptionRegistry::new();
        let a = conn();
        let b = conn();

        for v in ["v1", "v2", "v3"] {
            registry.subscribe(&a, v);
        }
        registry.subscribe(&b, "v2");

        a.mark_closed();
        assert_eq!(registry.remove_everywhere(&a), 3);

        for v in ["v1", "v2", "v3"] {
            assert!(!registry.is_subscribed(a.id(), v));
        }
        assert_eq!(ids(&registry.subscribers_of("v2")), HashSet::from([b.id().clone()]));
        assert_eq!(registry.video_count(), 1);
        assert!(registry.subscriptions_of(a.id()).is_empty());
    }

    #[test]
    fn remove_everywhere_without_subscriptions_is_noop() {
        let registry = SubscriptionRegistry::new();
        let a = conn();
        a.mark_closed();
        assert_eq!(registry.remove_everywhere(&a), 0);
        assert_eq!(registry.remove_everywhere(&a), 0);
    }

    #[test]
    fn closed_connection_cannot_subscribe() {
        let registry = SubscriptionRegistry::new();
        let a = conn();
        a.mark_closed();
        registry.remove_everywhere(&a);

        assert!(!registry.subscribe(&a, "v"));
        assert_eq!(registry.subscriber_count("v"), 0);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.video_count(), 0);
    }

    #[test]
    fn subscribers_of_is_a_snapshot() {
        let registry = SubscriptionRegistry::new();
        let a = conn();
        let b = conn();
        registry.subscribe(&a, "v");

        let snapshot = registry.subscribers_of("v");
        registry.subscribe(&b, "v");
        registry.unsubscribe(a.id(), "v");

        assert_eq!(ids(&snapshot), HashSet::from([a.id().clone()]));
        assert_eq!(ids(&registry.subscribers_of("v")), HashSet::from([b.id().clone()]));
    }

    #[test]
    fn drain_returns_each_handle_once() {
        let registry = SubscriptionRegistry::new();
        let a = conn();
        let b = conn();
        registry.subscribe(&a, "v1");
        registry.subscribe(&a, "v2");
        registry.subscribe(&b, "v2");

        let drained = registry.drain();
        assert_eq!(ids(&drained), HashSet::from([a.id().clone(), b.id().clone()]));
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.video_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn concurrent_subscribe_and_close_leave_no_stale_entries() {
        let registry = Arc::new(SubscriptionRegistry::new());

        for _ in 0..50 {
            let a = conn();
            let subscriber = {
                let registry = registry.clone();
                let a = a.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        registry.subscribe(&a, &format!("v{i}"));
                    }
                })
            };
            let closer = {
                let registry = registry.clone();
                let a = a.clone();
                std::thread::spawn(move || {
                    a.mark_closed();
                    registry.remove_everywhere(&a);
                })
            };
            subscriber.join().unwrap();
            closer.join().unwrap();

            assert!(registry.subscriptions_of(a.id()).is_empty());
            for i in 0..20 {
                assert!(!registry.is_subscribed(a.id(), &format!("v{i}")));
            }
        }
        assert_eq!(registry.video_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }
}
