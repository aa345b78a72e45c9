//! Messaging endpoint configuration: telemetry subscription and control channel.

use std::time::Duration;

use serde::Deserialize;

/// Default publish endpoint of the playback producer.
pub const DEFAULT_LIVESTREAM_ADDRESS: &str = "ipc:///tmp/playback.ipc";
/// Default topic filter for live telemetry.
pub const DEFAULT_LIVESTREAM_TOPIC: &str = "topic-playback";
/// Default endpoint of the replay backend.
pub const DEFAULT_CONTROL_ADDRESS: &str = "ipc:///tmp/replay.ipc";
/// Default bound on a single socket connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
/// Default connect retries at startup before giving up.
pub const DEFAULT_CONNECT_RETRIES: usize = 30;

/// What a streaming session does with a payload that fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeErrorPolicy {
    /// End the session and report the error to the consumer.
    #[default]
    Terminate,
    /// Log and drop the payload; keep streaming.
    Skip,
}

/// How requests are laid out on the control channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestFraming {
    /// One frame: the encoded request.
    #[default]
    Raw,
    /// Two frames: method name, then the encoded request.
    Tagged,
}

/// Live telemetry (publish/subscribe) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LivestreamConfig {
    /// Publisher endpoint to connect to.
    pub address: String,
    /// Topic prefixes to subscribe to. Empty subscribes to everything.
    pub topics: Vec<String>,
    /// Handling of undecodable payloads.
    pub decode_errors: DecodeErrorPolicy,
    /// Consumer-side stream errors tolerated before a session is closed.
    pub max_inbound_errors: u32,
    /// Delay between polls of a consumer stream that reported an error.
    pub retry_delay_ms: u64,
    /// Pause after an empty envelope before polling the subscriber again.
    pub idle_backoff_ms: u64,
    /// Bound on one connect attempt to the publisher.
    pub connect_timeout_ms: u64,
    /// Connect retries at startup.
    pub connect_retries: usize,
}

impl Default for LivestreamConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_LIVESTREAM_ADDRESS.to_string(),
            topics: vec![DEFAULT_LIVESTREAM_TOPIC.to_string()],
            decode_errors: DecodeErrorPolicy::Terminate,
            max_inbound_errors: 3,
            retry_delay_ms: 50,
            idle_backoff_ms: 10,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            connect_retries: DEFAULT_CONNECT_RETRIES,
        }
    }
}

impl LivestreamConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Control (dealer/router) channel configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Backend router endpoint to connect to.
    pub address: String,
    /// Time to wait for a reply before failing the call.
    pub reply_timeout_ms: u64,
    /// Request frame layout.
    pub framing: RequestFraming,
    /// Bound on one connect attempt to the backend, at startup and on
    /// reconnect.
    pub connect_timeout_ms: u64,
    /// Connect retries at startup.
    pub connect_retries: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_CONTROL_ADDRESS.to_string(),
            reply_timeout_ms: 5000,
            framing: RequestFraming::Raw,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            connect_retries: DEFAULT_CONNECT_RETRIES,
        }
    }
}

impl ControlConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_livestream_defaults() {
        let config = LivestreamConfig::default();
        assert_eq!(config.address, "ipc:///tmp/playback.ipc");
        assert_eq!(config.topics, vec!["topic-playback".to_string()]);
        assert_eq!(config.decode_errors, DecodeErrorPolicy::Terminate);
        assert_eq!(config.idle_backoff(), Duration::from_millis(10));
    }

    #[test]
    fn test_control_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.address, "ipc:///tmp/replay.ipc");
        assert_eq!(config.reply_timeout(), Duration::from_secs(5));
        assert_eq!(config.framing, RequestFraming::Raw);
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.connect_retries, 30);
    }
}
