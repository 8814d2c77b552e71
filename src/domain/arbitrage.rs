//! Cross-venue arbitrage detection.
//!
//! An opportunity exists when one venue's best ask sits below another
//! venue's best bid by more than the configured threshold. Executable volume
//! comes from walking the buy venue's asks against the sell venue's bids
//! while the prices remain crossed, consuming partial levels as it goes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::book::{OrderBook, PriceLevel};
use super::id::{Symbol, VenueId};
use super::market::FeeSchedule;
use super::ticker::Ticker;

/// How estimated profit treats trading fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeMode {
    /// Spread times volume, fees ignored.
    #[default]
    Gross,
    /// Both legs pay their venue's taker fee.
    NetTaker,
}

/// Configuration for the arbitrage scanner.
#[derive(Debug, Clone, Deserialize)]
pub struct ArbitrageConfig {
    /// Minimum spread, in percent of the buy price, to report.
    #[serde(default = "default_min_spread_pct")]
    pub min_spread_pct: Decimal,

    #[serde(default)]
    pub fee_mode: FeeMode,

    /// Levels requested per book when sizing an opportunity.
    #[serde(default = "default_book_depth")]
    pub book_depth: usize,
}

fn default_min_spread_pct() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

const fn default_book_depth() -> usize {
    100
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            min_spread_pct: default_min_spread_pct(),
            fee_mode: FeeMode::default(),
            book_depth: default_book_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub symbol: Symbol,
    pub buy_venue: VenueId,
    pub sell_venue: VenueId,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub spread: Decimal,
    pub spread_pct: Decimal,
    /// Base quantity that can be bought and sold while prices stay crossed.
    pub max_volume: Decimal,
    pub estimated_profit: Decimal,
    pub detected_at: DateTime<Utc>,
}

/// The venue pair a scan would trade: lowest ask and highest bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossedQuotes {
    pub buy_venue: VenueId,
    pub buy_price: Decimal,
    pub sell_venue: VenueId,
    pub sell_price: Decimal,
}

impl CrossedQuotes {
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.sell_price - self.buy_price
    }

    #[must_use]
    pub fn spread_pct(&self) -> Decimal {
        self.spread() / self.buy_price * Decimal::ONE_HUNDRED
    }
}

/// Find the lowest-ask and highest-bid venues if they differ and the spread
/// clears `min_spread_pct`.
#[must_use]
pub fn find_crossed(tickers: &[Ticker], min_spread_pct: Decimal) -> Option<CrossedQuotes> {
    let buy = tickers
        .iter()
        .filter(|t| t.ask > Decimal::ZERO)
        .min_by_key(|t| t.ask)?;
    let sell = tickers
        .iter()
        .filter(|t| t.bid > Decimal::ZERO)
        .max_by_key(|t| t.bid)?;

    if buy.venue == sell.venue || sell.bid <= buy.ask {
        return None;
    }

    let quotes = CrossedQuotes {
        buy_venue: buy.venue,
        buy_price: buy.ask,
        sell_venue: sell.venue,
        sell_price: sell.bid,
    };
    (quotes.spread_pct() > min_spread_pct).then_some(quotes)
}

/// Volume executable by lifting `asks` and hitting `bids` while the current
/// ask is strictly below the current bid.
#[must_use]
pub fn executable_volume(asks: &[PriceLevel], bids: &[PriceLevel]) -> Decimal {
    let mut asks = asks.iter().copied();
    let mut bids = bids.iter().copied();
    let mut ask = asks.next();
    let mut bid = bids.next();
    let mut volume = Decimal::ZERO;

    while let (Some(mut a), Some(mut b)) = (ask, bid) {
        if a.price >= b.price {
            break;
        }
        let matched = a.quantity.min(b.quantity);
        volume += matched;
        a.quantity -= matched;
        b.quantity -= matched;

        ask = if a.quantity.is_zero() { asks.next() } else { Some(a) };
        bid = if b.quantity.is_zero() { bids.next() } else { Some(b) };
    }

    volume
}

/// Size and price an opportunity from the two venues' books.
///
/// Returns `None` when the books leave no executable volume, or when fee
/// netting pushes the spread under the threshold.
#[must_use]
pub fn evaluate_opportunity(
    symbol: &Symbol,
    quotes: CrossedQuotes,
    buy_book: &OrderBook,
    sell_book: &OrderBook,
    buy_fees: FeeSchedule,
    sell_fees: FeeSchedule,
    config: &ArbitrageConfig,
) -> Option<ArbitrageOpportunity> {
    let max_volume = executable_volume(&buy_book.asks, &sell_book.bids);
    if max_volume <= Decimal::ZERO {
        return None;
    }

    let (unit_profit, spread_pct) = match config.fee_mode {
        FeeMode::Gross => (quotes.spread(), quotes.spread_pct()),
        FeeMode::NetTaker => {
            let cost = quotes.buy_price * (Decimal::ONE + buy_fees.taker);
            let proceeds = quotes.sell_price * (Decimal::ONE - sell_fees.taker);
            let net = proceeds - cost;
            let pct = net / quotes.buy_price * Decimal::ONE_HUNDRED;
            if pct <= config.min_spread_pct {
                return None;
            }
            (net, pct)
        }
    };

    Some(ArbitrageOpportunity {
        symbol: symbol.clone(),
        buy_venue: quotes.buy_venue,
        sell_venue: quotes.sell_venue,
        buy_price: quotes.buy_price,
        sell_price: quotes.sell_price,
        spread: quotes.spread(),
        spread_pct,
        max_volume,
        estimated_profit: unit_profit * max_volume,
        detected_at: Utc::now(),
    })
}

/// Sort opportunities by spread percent, largest first.
pub fn rank_opportunities(opportunities: &mut [ArbitrageOpportunity]) {
    opportunities.sort_by(|a, b| b.spread_pct.cmp(&a.spread_pct));
}
