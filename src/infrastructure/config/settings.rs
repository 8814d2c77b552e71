//! Application configuration loading and validation.
//!
//! Provides the main [`Settings`] struct that aggregates all gateway settings.
//! Configuration is loaded from a TOML file; API credentials are read from
//! `<VENUE>_API_KEY`, `<VENUE>_API_SECRET` and `<VENUE>_API_PASSPHRASE`
//! environment variables, never from the file.
//!
//! # Example
//!
//! ```no_run
//! use venuebridge::infrastructure::config::settings::Settings;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load("config.toml")?;
//!     settings.init_logging();
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::logging::LoggingConfig;
use super::network::{HttpConfig, StreamConfig};
use super::venue::{Credentials, ExchangeConfig};
use crate::domain::{ArbitrageConfig, VenueId};
use crate::error::{ConfigError, Result};

/// Main gateway configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// REST timeouts and retry policy.
    #[serde(default)]
    pub http: HttpConfig,

    /// WebSocket reconnection and keep-alive settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Arbitrage scanner thresholds.
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,

    /// Configured venues. When empty, every supported venue is enabled with
    /// its default priority.
    #[serde(default)]
    pub exchanges: Vec<ExchangeConfig>,
}

impl Settings {
    /// Parse configuration from TOML content, reading credentials from the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        Self::parse_toml_with_env(content, |name| std::env::var(name).ok())
    }

    /// Like [`parse_toml`](Self::parse_toml) with an explicit variable lookup.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml_with_env<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings: Self = toml::from_str(content).map_err(ConfigError::Parse)?;

        if settings.exchanges.is_empty() {
            settings.exchanges = VenueId::ALL.into_iter().map(ExchangeConfig::new).collect();
        }
        // Credentials only ever come from the environment.
        for exchange in &mut settings.exchanges {
            exchange.credentials = Credentials::from_lookup(exchange.name, &lookup);
        }

        settings.validate()?;

        Ok(settings)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    pub fn init_logging(&self) {
        self.logging.init();
    }

    /// Enabled venues, in configuration order.
    pub fn enabled_exchanges(&self) -> impl Iterator<Item = &ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled)
    }

    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        if self.http.timeout_ms == 0 {
            return Err(invalid("timeout_ms", "must be greater than 0"));
        }
        if self.http.retry_max_delay_ms < self.http.retry_base_delay_ms {
            return Err(invalid("retry_max_delay_ms", "must be >= retry_base_delay_ms"));
        }

        if self.stream.initial_delay_ms == 0 {
            return Err(invalid("initial_delay_ms", "must be greater than 0"));
        }
        if self.stream.max_delay_ms < self.stream.initial_delay_ms {
            return Err(invalid("max_delay_ms", "must be >= initial_delay_ms"));
        }
        if self.stream.backoff_multiplier < 1.0 {
            return Err(invalid("backoff_multiplier", "must be >= 1.0"));
        }
        if self.stream.channel_capacity == 0 {
            return Err(invalid("channel_capacity", "must be greater than 0"));
        }
        if self.stream.keepalive_interval_secs == 0 {
            return Err(invalid("keepalive_interval_secs", "must be greater than 0"));
        }

        if self.arbitrage.min_spread_pct < Decimal::ZERO {
            return Err(invalid("min_spread_pct", "must be 0 or greater"));
        }
        if self.arbitrage.book_depth == 0 {
            return Err(invalid("book_depth", "must be greater than 0"));
        }

        let mut seen = BTreeSet::new();
        for exchange in &self.exchanges {
            if !seen.insert(exchange.name) {
                return Err(ConfigError::InvalidValue {
                    field: "exchanges",
                    reason: format!("{} is configured more than once", exchange.name),
                }
                .into());
            }
            validate_exchange(exchange)?;
        }

        Ok(())
    }
}

#[allow(clippy::result_large_err)]
fn validate_exchange(exchange: &ExchangeConfig) -> Result<()> {
    if exchange.priority > 100 {
        return Err(invalid("priority", "must be between 0 and 100"));
    }
    if exchange.max_order_size.is_some_and(|max| max <= Decimal::ZERO) {
        return Err(invalid("max_order_size", "must be greater than 0"));
    }
    let quota = exchange.rate_limit;
    if quota.per_second == 0 || quota.per_minute == 0 || quota.per_hour == 0 {
        return Err(invalid("rate_limit", "quotas must be greater than 0"));
    }
    for fee in [exchange.maker_fee, exchange.taker_fee].into_iter().flatten() {
        if fee < Decimal::ZERO || fee >= Decimal::ONE {
            return Err(invalid("fee", "must be between 0 and 1"));
        }
    }
    Ok(())
}

fn invalid(field: &'static str, reason: &str) -> crate::error::Error {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
    .into()
}
