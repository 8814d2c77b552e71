//! Static venue metadata.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::candle::Timeframe;
use super::id::{Symbol, VenueId};
use super::order::OrderType;

/// One tradable pair on a venue, loaded once per connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub symbol: Symbol,
    /// The venue's own spelling of the pair.
    pub venue_symbol: String,
    pub base: String,
    pub quote: String,
    pub active: bool,
    /// Decimal places accepted for prices.
    pub price_precision: u32,
    /// Decimal places accepted for amounts.
    pub amount_precision: u32,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub min_notional: Option<Decimal>,
}

/// Maker/taker fee rates as fractions (0.001 = 0.1%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker: Decimal,
    pub taker: Decimal,
}

impl FeeSchedule {
    #[must_use]
    pub const fn new(maker: Decimal, taker: Decimal) -> Self {
        Self { maker, taker }
    }

    pub const ZERO: Self = Self::new(Decimal::ZERO, Decimal::ZERO);
}

/// Outbound request quotas enforced per connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuota {
    #[serde(default = "default_per_second")]
    pub per_second: u32,
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,
}

const fn default_per_second() -> u32 {
    10
}

const fn default_per_minute() -> u32 {
    600
}

const fn default_per_hour() -> u32 {
    36_000
}

impl Default for RateQuota {
    fn default() -> Self {
        Self {
            per_second: default_per_second(),
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueStatus {
    Online,
    Maintenance,
}

/// Venue-level description returned by `get_exchange_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeInfo {
    pub venue: VenueId,
    pub name: String,
    pub status: VenueStatus,
    pub fees: FeeSchedule,
    pub rate_limits: RateQuota,
    pub timeframes: Vec<Timeframe>,
    pub order_types: Vec<OrderType>,
    pub markets: Vec<Market>,
}

/// Published default fees, used when the configuration carries no override.
#[must_use]
pub fn default_fees(venue: VenueId) -> FeeSchedule {
    match venue {
        VenueId::Binance => FeeSchedule::new(dec!(0.001), dec!(0.001)),
        VenueId::Coinbase => FeeSchedule::new(dec!(0.004), dec!(0.006)),
        VenueId::Kraken => FeeSchedule::new(dec!(0.0016), dec!(0.0026)),
    }
}

/// Number of decimal places implied by a step size such as `0.00010000`.
#[must_use]
pub fn precision_from_step(step: Decimal) -> u32 {
    if step <= Decimal::ZERO {
        return 0;
    }
    step.normalize().scale()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_from_step_strips_trailing_zeros() {
        assert_eq!(precision_from_step(dec!(0.01000000)), 2);
        assert_eq!(precision_from_step(dec!(0.00001)), 5);
        assert_eq!(precision_from_step(dec!(1.00000000)), 0);
        assert_eq!(precision_from_step(Decimal::ZERO), 0);
    }

    #[test]
    fn quota_defaults() {
        let quota = RateQuota::default();
        assert_eq!(
            (quota.per_second, quota.per_minute, quota.per_hour),
            (10, 600, 36_000)
        );
    }
}
