//! Per-venue configuration and credentials.

use std::fmt;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::market::default_fees;
use crate::domain::{FeeSchedule, RateQuota, Symbol, VenueId};

/// API credentials for one venue.
///
/// Loaded from the environment at runtime, never from the config file.
/// `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
    passphrase: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            passphrase: None,
        }
    }

    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    #[must_use]
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    /// Read `<VENUE>_API_KEY`, `<VENUE>_API_SECRET` and `<VENUE>_API_PASSPHRASE`
    /// through `lookup`. Key and secret must both be present and non-empty.
    pub fn from_lookup<F>(venue: VenueId, lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = venue.env_prefix();
        let read = |suffix: &str| lookup(&format!("{prefix}_{suffix}")).filter(|v| !v.trim().is_empty());
        let credentials = Self::new(read("API_KEY")?, read("API_SECRET")?);
        Some(match read("API_PASSPHRASE") {
            Some(passphrase) => credentials.with_passphrase(passphrase),
            None => credentials,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Show only the last four characters of a key.
fn redact(value: &str) -> String {
    let tail: String = value
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if value.chars().count() <= 4 {
        "****".into()
    } else {
        format!("****{tail}")
    }
}

/// Configuration for one venue, as read from `[[exchanges]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub name: VenueId,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Routing priority, 0..=100. Higher wins the lowest-fee strategy.
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Largest amount a single routed order may carry.
    #[serde(default)]
    pub max_order_size: Option<Decimal>,

    /// Tradable symbols. Empty means every symbol.
    #[serde(default)]
    pub symbols: Vec<Symbol>,

    /// Use the venue's test environment.
    #[serde(default)]
    pub sandbox: bool,

    #[serde(default)]
    pub maker_fee: Option<Decimal>,

    #[serde(default)]
    pub taker_fee: Option<Decimal>,

    #[serde(default)]
    pub rate_limit: RateQuota,

    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u8 {
    1
}

impl ExchangeConfig {
    /// Enabled, public-only configuration with the venue's default priority.
    #[must_use]
    pub fn new(venue: VenueId) -> Self {
        Self {
            name: venue,
            enabled: true,
            priority: Self::default_priority(venue),
            max_order_size: None,
            symbols: Vec::new(),
            sandbox: false,
            maker_fee: None,
            taker_fee: None,
            rate_limit: RateQuota::default(),
            credentials: None,
        }
    }

    #[must_use]
    pub const fn default_priority(venue: VenueId) -> u8 {
        match venue {
            VenueId::Binance => 3,
            VenueId::Coinbase => 2,
            VenueId::Kraken => 1,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_max_order_size(mut self, max: Decimal) -> Self {
        self.max_order_size = Some(max);
        self
    }

    #[must_use]
    pub fn with_symbols(mut self, symbols: Vec<Symbol>) -> Self {
        self.symbols = symbols;
        self
    }

    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Fee schedule with any configured overrides applied.
    #[must_use]
    pub fn fees(&self) -> FeeSchedule {
        let defaults = default_fees(self.name);
        FeeSchedule::new(
            self.maker_fee.unwrap_or(defaults.maker),
            self.taker_fee.unwrap_or(defaults.taker),
        )
    }

    /// Whether the allowlist admits `symbol`.
    #[must_use]
    pub fn allows(&self, symbol: &Symbol) -> bool {
        self.symbols.is_empty() || self.symbols.contains(symbol)
    }

    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn debug_never_prints_secrets() {
        let creds = Credentials::new("abcdefgh1234", "topsecret").with_passphrase("pass");
        let printed = format!("{creds:?}");
        assert!(printed.contains("****1234"));
        assert!(!printed.contains("topsecret"));
        assert!(!printed.contains("abcdefgh"));
        assert!(!printed.contains("pass\""));
    }

    #[test]
    fn credentials_require_key_and_secret() {
        let lookup = |name: &str| match name {
            "COINBASE_API_KEY" => Some("k".to_string()),
            "COINBASE_API_SECRET" => Some("s".to_string()),
            "COINBASE_API_PASSPHRASE" => Some("p".to_string()),
            "KRAKEN_API_KEY" => Some("k".to_string()),
            _ => None,
        };
        let coinbase = Credentials::from_lookup(VenueId::Coinbase, lookup).unwrap();
        assert_eq!(coinbase.passphrase(), Some("p"));
        assert!(Credentials::from_lookup(VenueId::Kraken, lookup).is_none());
    }

    #[test]
    fn fee_overrides_replace_defaults() {
        let mut config = ExchangeConfig::new(VenueId::Binance);
        config.taker_fee = Some(dec!(0.00075));
        assert_eq!(config.fees(), FeeSchedule::new(dec!(0.001), dec!(0.00075)));
    }

    #[test]
    fn empty_allowlist_allows_everything() {
        let config = ExchangeConfig::new(VenueId::Kraken);
        assert!(config.allows(&Symbol::new("BTCUSDT")));
        let config = config.with_symbols(vec![Symbol::new("ETHUSDT")]);
        assert!(!config.allows(&Symbol::new("BTCUSDT")));
    }
}
