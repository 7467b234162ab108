use std::time::Duration;

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Capacity of each connection's outbound queue. Events for a connection
    /// whose queue is full are dropped for that connection only.
    pub outbound_buffer: usize,
    /// A connection with no inbound traffic for this long is closed.
    pub idle_timeout: Duration,
    /// Synthetic timestamp ticker. `None` disables it.
    pub ticker: Option<TickerConfig>,
}

/// Settings for the fixed-interval timestamp ticker.
#[derive(Debug, Clone)]
pub struct TickerConfig {
    pub interval: Duration,
    pub video_id: String,
    pub user_id: String,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            video_id: "example_video_uuid".to_string(),
            user_id: "example_user_uuid".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            outbound_buffer: 64,
            idle_timeout: Duration::from_secs(60),
            ticker: Some(TickerConfig::default()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset or unparsable values fall back to
    /// [`Config::default`].
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ticker_defaults = TickerConfig::default();

        let ticker = parsed_var::<bool>("TICKER_ENABLED")
            .unwrap_or(true)
            .then(|| TickerConfig {
                interval: parsed_var::<u64>("TICK_INTERVAL_SECS")
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(ticker_defaults.interval),
                video_id: string_var("TICK_VIDEO_ID").unwrap_or(ticker_defaults.video_id),
                user_id: string_var("TICK_USER_ID").unwrap_or(ticker_defaults.user_id),
            });

        Self {
            port: parsed_var::<u16>("PORT").unwrap_or(defaults.port),
            outbound_buffer: parsed_var::<usize>("OUTBOUND_BUFFER")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.outbound_buffer),
            idle_timeout: parsed_var::<u64>("IDLE_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            ticker,
        }
    }
}

fn string_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    string_var(name).and_then(|v| v.parse().ok())
}
