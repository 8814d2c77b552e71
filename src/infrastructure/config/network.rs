//! HTTP and streaming transport configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::adapter::outbound::shared::{RetryPolicy, SessionConfig};

/// REST client settings shared by every connector.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Attempts after the first for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries.saturating_add(1),
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

/// WebSocket session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Initial delay before the first reconnection attempt (milliseconds).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between reconnection attempts (milliseconds).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Consecutive failures tolerated before a session is marked unavailable.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Buffered updates per subscription.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Private stream renewal interval (seconds).
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    /// Application heartbeat interval (seconds).
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_initial_delay_ms() -> u64 {
    1000 // 1 second
}

fn default_max_delay_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_keepalive_interval_secs() -> u64 {
    1800 // 30 minutes
}

fn default_ping_interval_secs() -> u64 {
    30
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            channel_capacity: default_channel_capacity(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl StreamConfig {
    #[must_use]
    pub const fn session(&self) -> SessionConfig {
        SessionConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_reconnect_attempts: self.max_reconnect_attempts,
            channel_capacity: self.channel_capacity,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
        }
    }

    #[must_use]
    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}
