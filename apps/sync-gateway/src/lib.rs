pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use config::Config;
use gateway::broadcast::Broadcaster;
use gateway::publisher::{IntervalSource, TimestampPublisher};
use gateway::registry::SubscriptionRegistry;
use gateway::server::CLOSE_GOING_AWAY;
use gateway::tracker::ConnectionTracker;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SubscriptionRegistry>,
    pub connections: Arc<ConnectionTracker>,
    pub broadcaster: Broadcaster,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build fresh state with an empty subscription registry.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        Self {
            config: Arc::new(config),
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            connections: Arc::new(ConnectionTracker::new()),
            started_at: Utc::now(),
        }
    }

    /// Start the fixed-interval timestamp ticker, if configured.
    pub fn spawn_ticker(&self) -> Option<JoinHandle<u64>> {
        let ticker = self.config.ticker.as_ref()?;
        tracing::info!(
            interval_ms = ticker.interval.as_millis() as u64,
            video_id = %ticker.video_id,
            "timestamp ticker enabled"
        );
        let source = IntervalSource::new(ticker.interval, &ticker.video_id, &ticker.user_id);
        Some(TimestampPublisher::new(source, self.broadcaster.clone()).spawn())
    }

    /// Close every live connection with a going-away frame and wait up to
    /// `timeout` for their tasks to finish, then empty the registry.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let closing = self.connections.close_all(CLOSE_GOING_AWAY, "Server shutting down");
        let drained = self.connections.wait_idle(timeout).await;
        let remaining = self.connections.len();
        if !drained {
            tracing::warn!(remaining, "connections still open after shutdown timeout");
        }
        let stale_subscribers = self.registry.drain().len();
        ShutdownReport {
            closing,
            remaining,
            stale_subscribers,
        }
    }
}

/// Outcome of [`AppState::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Connections sent a close frame.
    pub closing: usize,
    /// Connections whose tasks had not finished by the timeout.
    pub remaining: usize,
    /// Subscribers still in the registry when it was emptied.
    pub stale_subscribers: usize,
}
