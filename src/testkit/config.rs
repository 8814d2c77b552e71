//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.
//! Avoids each test module defining its own slightly-different defaults.

use std::sync::Arc;
use std::time::Duration;

use crate::adapter::outbound::shared::{ConnectorOptions, SessionConfig, WsTransport};
use crate::infrastructure::config::{HttpConfig, StreamConfig};

/// Session config with millisecond backoff and a heartbeat that never fires.
pub fn session(max_reconnect_attempts: u32) -> SessionConfig {
    SessionConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        backoff_multiplier: 2.0,
        max_reconnect_attempts,
        channel_capacity: 16,
        ping_interval: Duration::from_secs(3600),
    }
}

/// Stream config matching [`session`].
pub fn stream(max_reconnect_attempts: u32) -> StreamConfig {
    StreamConfig {
        initial_delay_ms: 10,
        max_delay_ms: 100,
        backoff_multiplier: 2.0,
        max_reconnect_attempts,
        channel_capacity: 16,
        keepalive_interval_secs: 3600,
        ping_interval_secs: 3600,
    }
}

/// HTTP config with no retries and a short timeout.
pub fn http() -> HttpConfig {
    HttpConfig {
        timeout_ms: 2_000,
        max_retries: 0,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 1,
    }
}

/// Connector options wired to a scripted transport.
pub fn options(transport: Arc<dyn WsTransport>) -> ConnectorOptions {
    ConnectorOptions::new(http(), stream(2)).with_transport(transport)
}
