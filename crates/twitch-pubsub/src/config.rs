//! Client configuration.

use std::time::Duration;

/// Default PubSub edge endpoint.
pub const DEFAULT_URL: &str = "wss://pubsub-edge.twitch.tv";

/// Configuration for a [`PubSubClient`](crate::PubSubClient).
#[derive(Clone, Debug)]
pub struct PubSubConfig {
    /// WebSocket endpoint URL.
    pub url: String,

    // Reconnection settings
    /// Delay before the first reconnect attempt; the sequence floor.
    pub reconnect_floor: Duration,
    /// Maximum delay between reconnect attempts.
    pub reconnect_ceiling: Duration,
    /// Upper bound of the random jitter added to each reconnect delay.
    pub reconnect_jitter: Duration,

    // Keepalive settings
    /// Nominal interval between PING frames.
    pub ping_interval: Duration,
    /// Upper bound of the random jitter subtracted from each ping interval,
    /// so pings are sent slightly early rather than late.
    pub ping_jitter: Duration,
    /// How long to wait for a PONG after a PING before forcing a reconnect.
    pub pong_grace: Duration,

    // Channels
    /// Capacity of the command channel to the connection actor.
    pub command_channel_capacity: usize,
    /// Capacity of the event broadcast channels.
    pub event_channel_capacity: usize,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            reconnect_floor: Duration::from_millis(1000),
            reconnect_ceiling: Duration::from_millis(120_000),
            reconnect_jitter: Duration::from_millis(500),
            ping_interval: Duration::from_secs(4 * 60),
            ping_jitter: Duration::from_secs(30),
            pong_grace: Duration::from_secs(12),
            command_channel_capacity: 64,
            event_channel_capacity: 256,
        }
    }
}

impl PubSubConfig {
    /// Create a configuration for the default endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the reconnect delay floor.
    #[must_use]
    pub fn reconnect_floor(mut self, floor: Duration) -> Self {
        self.reconnect_floor = floor;
        self
    }

    /// Set the reconnect delay ceiling.
    #[must_use]
    pub fn reconnect_ceiling(mut self, ceiling: Duration) -> Self {
        self.reconnect_ceiling = ceiling;
        self
    }

    /// Set the reconnect jitter bound.
    #[must_use]
    pub fn reconnect_jitter(mut self, jitter: Duration) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    /// Set the nominal ping interval.
    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the ping jitter bound.
    #[must_use]
    pub fn ping_jitter(mut self, jitter: Duration) -> Self {
        self.ping_jitter = jitter;
        self
    }

    /// Set the pong grace window.
    #[must_use]
    pub fn pong_grace(mut self, grace: Duration) -> Self {
        self.pong_grace = grace;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_owned());
        }
        if self.reconnect_floor.is_zero() {
            return Err("Reconnect floor must be > 0".to_owned());
        }
        if self.reconnect_ceiling < self.reconnect_floor {
            return Err("Reconnect ceiling must be >= floor".to_owned());
        }
        if self.ping_interval.is_zero() {
            return Err("Ping interval must be > 0".to_owned());
        }
        if self.ping_jitter >= self.ping_interval {
            return Err("Ping jitter must be smaller than the ping interval".to_owned());
        }
        if self.pong_grace.is_zero() {
            return Err("Pong grace must be > 0".to_owned());
        }
        if self.command_channel_capacity == 0 {
            return Err("Command channel capacity must be > 0".to_owned());
        }
        if self.event_channel_capacity == 0 {
            return Err("Event channel capacity must be > 0".to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_protocol_constants() {
        let config = PubSubConfig::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.reconnect_floor, Duration::from_millis(1000));
        assert_eq!(config.reconnect_ceiling, Duration::from_millis(120_000));
        assert_eq!(config.reconnect_jitter, Duration::from_millis(500));
        assert_eq!(config.ping_interval, Duration::from_secs(240));
        assert_eq!(config.ping_jitter, Duration::from_secs(30));
        assert_eq!(config.pong_grace, Duration::from_secs(12));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = PubSubConfig::new()
            .url("wss://localhost:9443")
            .ping_interval(Duration::from_secs(30))
            .ping_jitter(Duration::from_secs(5))
            .reconnect_floor(Duration::from_millis(10));
        assert_eq!(config.url, "wss://localhost:9443");
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect_floor, Duration::from_millis(10));
    }

    #[test]
    fn validation_rejects_empty_url() {
        let config = PubSubConfig::new().url("");
        assert_eq!(config.validate().unwrap_err(), "URL cannot be empty");
    }

    #[test]
    fn validation_rejects_ceiling_below_floor() {
        let config = PubSubConfig::new()
            .reconnect_floor(Duration::from_secs(10))
            .reconnect_ceiling(Duration::from_secs(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_jitter_at_interval() {
        let config = PubSubConfig::new()
            .ping_interval(Duration::from_secs(10))
            .ping_jitter(Duration::from_secs(10));
        assert!(config.validate().is_err());
    }
}
