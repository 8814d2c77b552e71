//! Identifier types shared by every venue.
//!
//! Symbols are always held in the canonical form (`BTCUSDT`): uppercase,
//! base asset followed by quote asset, no separator. Venue adapters translate
//! to and from their native spelling at the edge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Supported trading venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    Binance,
    Coinbase,
    Kraken,
}

impl VenueId {
    pub const ALL: [Self; 3] = [Self::Binance, Self::Coinbase, Self::Kraken];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Coinbase => "coinbase",
            Self::Kraken => "kraken",
        }
    }

    /// Prefix for the environment variables holding this venue's credentials.
    #[must_use]
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::Binance => "BINANCE",
            Self::Coinbase => "COINBASE",
            Self::Kraken => "KRAKEN",
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VenueId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "coinbase" => Ok(Self::Coinbase),
            "kraken" => Ok(Self::Kraken),
            other => Err(ConfigError::UnsupportedVenue(other.to_string())),
        }
    }
}

/// Quote assets recognised when splitting a canonical symbol, longest first.
const QUOTE_ASSETS: [&str; 9] = [
    "USDT", "USDC", "BUSD", "USD", "EUR", "GBP", "BTC", "ETH", "BNB",
];

/// Canonical trading pair symbol, e.g. `BTCUSDT`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, normalising to uppercase.
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_ascii_uppercase())
    }

    /// Build a symbol from its base and quote assets.
    pub fn from_assets(base: &str, quote: &str) -> Self {
        Self::new(format!("{base}{quote}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(base, quote)` using the known quote asset list.
    ///
    /// Returns `None` when no known quote asset terminates the symbol.
    #[must_use]
    pub fn split(&self) -> Option<(&str, &str)> {
        QUOTE_ASSETS.iter().find_map(|quote| {
            let base = self.0.strip_suffix(quote)?;
            (!base.is_empty()).then_some((base, *quote))
        })
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Venue-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
