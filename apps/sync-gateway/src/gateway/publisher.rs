//! Timestamp publisher: pulls playback updates from a source and broadcasts
//! them to the subscribers of each video.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use super::broadcast::Broadcaster;
use super::events::ServerEvent;

/// One playback-position update for a video.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampUpdate {
    pub video_id: String,
    pub timestamp: f64,
    pub user_id: String,
}

impl TimestampUpdate {
    /// Split into the routing key and the outbound event.
    pub fn into_event(self) -> (String, ServerEvent) {
        let event = ServerEvent::TimestampUpdated {
            timestamp: self.timestamp,
            user_id: self.user_id,
        };
        (self.video_id, event)
    }
}

/// Producer of timestamp updates. Returning `None` ends publishing.
#[async_trait]
pub trait TimestampSource: Send {
    async fn next_update(&mut self) -> Option<TimestampUpdate>;
}

// ---------------------------------------------------------------------------
// Fixed-interval synthetic source
// ---------------------------------------------------------------------------

/// Emits a random timestamp in `[0, 100)` for one fixed video every period.
/// Stands in for a real playback authority.
pub struct IntervalSource {
    interval: Interval,
    video_id: String,
    user_id: String,
}

impl IntervalSource {
    /// The first update fires one full `period` after creation. A zero
    /// period is raised to one millisecond.
    pub fn new(period: Duration, video_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            video_id: video_id.into(),
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl TimestampSource for IntervalSource {
    async fn next_update(&mut self) -> Option<TimestampUpdate> {
        self.interval.tick().await;
        let timestamp = rand::thread_rng().gen_range(0.0..100.0);
        Some(TimestampUpdate {
            video_id: self.video_id.clone(),
            timestamp,
            user_id: self.user_id.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Externally driven source
// ---------------------------------------------------------------------------

/// Updates pushed in from elsewhere in the process through a channel.
/// Publishing ends once every sender is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<TimestampUpdate>,
}

impl ChannelSource {
    pub fn channel(capacity: usize) -> (mpsc::Sender<TimestampUpdate>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl TimestampSource for ChannelSource {
    async fn next_update(&mut self) -> Option<TimestampUpdate> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Publisher task
// ---------------------------------------------------------------------------

pub struct TimestampPublisher<S> {
    source: S,
    broadcaster: Broadcaster,
}

impl<S: TimestampSource + 'static> TimestampPublisher<S> {
    pub fn new(source: S, broadcaster: Broadcaster) -> Self {
        Self {
            source,
            broadcaster,
        }
    }

    /// Broadcast updates until the source is exhausted. Returns the number
    /// of updates published.
    pub async fn run(mut self) -> u64 {
        let mut published = 0;
        while let Some(update) = self.source.next_update().await {
            let (video_id, event) = update.into_event();
            let report = self.broadcaster.broadcast(&video_id, &event);
            tracing::debug!(
                %video_id,
                delivered = report.delivered,
                dropped = report.dropped,
                "published timestamp update"
            );
            published += 1;
        }
        tracing::info!(published, "timestamp source exhausted");
        published
    }

    /// Run the publisher as its own task.
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }
}
