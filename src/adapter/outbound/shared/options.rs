//! Construction options shared by every connector.

use std::sync::Arc;

use super::http::RestSettings;
use super::stream::{TungsteniteTransport, WsTransport};
use crate::infrastructure::config::{ExchangeConfig, HttpConfig, StreamConfig};

/// Transport settings and endpoint overrides handed to each connector.
#[derive(Clone)]
pub struct ConnectorOptions {
    pub http: HttpConfig,
    pub stream: StreamConfig,
    pub transport: Arc<dyn WsTransport>,
    /// Replaces the venue's REST base URL (local test servers, proxies).
    pub rest_url: Option<String>,
    /// Replaces the venue's WebSocket base URL.
    pub ws_url: Option<String>,
}

impl ConnectorOptions {
    #[must_use]
    pub fn new(http: HttpConfig, stream: StreamConfig) -> Self {
        Self {
            http,
            stream,
            transport: Arc::new(TungsteniteTransport),
            rest_url: None,
            ws_url: None,
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn WsTransport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// REST settings for `config`, defaulting the base URL to `default_url`.
    #[must_use]
    pub fn rest_settings(&self, config: &ExchangeConfig, default_url: &str) -> RestSettings {
        RestSettings {
            base_url: self.rest_url.clone().unwrap_or_else(|| default_url.to_string()),
            timeout: self.http.timeout(),
            retry: self.http.retry_policy(),
            quota: config.rate_limit,
        }
    }

    #[must_use]
    pub fn ws_url_or(&self, default_url: &str) -> String {
        self.ws_url
            .clone()
            .unwrap_or_else(|| default_url.to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self::new(HttpConfig::default(), StreamConfig::default())
    }
}
