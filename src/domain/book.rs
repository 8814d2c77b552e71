//! Order book types for market depth representation.
//!
//! An order book has two sides:
//! - **Bids**: buy orders, sorted by price descending (best bid first)
//! - **Asks**: sell orders, sorted by price ascending (best ask first)
//!
//! # Examples
//!
//! ```
//! use venuebridge::domain::book::{OrderBook, PriceLevel};
//! use venuebridge::domain::id::{Symbol, VenueId};
//! use rust_decimal_macros::dec;
//!
//! let book = OrderBook::new(
//!     VenueId::Binance,
//!     Symbol::new("BTCUSDT"),
//!     vec![PriceLevel::new(dec!(99), dec!(1)), PriceLevel::new(dec!(100), dec!(2))],
//!     vec![PriceLevel::new(dec!(102), dec!(1)), PriceLevel::new(dec!(101), dec!(3))],
//! );
//!
//! assert_eq!(book.best_bid().unwrap().price, dec!(100));
//! assert_eq!(book.best_ask().unwrap().price, dec!(101));
//! ```

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{Symbol, VenueId};
use super::order::Side;

/// A single price level: aggregated resting quantity at one price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    #[must_use]
    pub const fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Order book for one symbol on one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub venue: VenueId,
    pub symbol: Symbol,
    /// Sorted by price descending.
    pub bids: Vec<PriceLevel>,
    /// Sorted by price ascending.
    pub asks: Vec<PriceLevel>,
    /// Venue update sequence, where the venue provides one.
    pub nonce: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    /// Build a book, sorting both sides into best-first order.
    #[must_use]
    pub fn new(
        venue: VenueId,
        symbol: Symbol,
        mut bids: Vec<PriceLevel>,
        mut asks: Vec<PriceLevel>,
    ) -> Self {
        bids.sort_by_key(|l| Reverse(l.price));
        asks.sort_by_key(|l| l.price);
        Self {
            venue,
            symbol,
            bids,
            asks,
            nonce: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub const fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Levels a taker on `side` would consume: asks for a buy, bids for a sell.
    #[must_use]
    pub fn liquidity_side(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        }
    }

    /// Total quantity available to a taker on `side`.
    #[must_use]
    pub fn depth(&self, side: Side) -> Decimal {
        self.liquidity_side(side).iter().map(|l| l.quantity).sum()
    }

    /// Keep at most `depth` levels per side.
    pub fn truncate(&mut self, depth: usize) {
        self.bids.truncate(depth);
        self.asks.truncate(depth);
    }
}

/// Volume-weighted average fill price for taking `amount` from `levels`.
///
/// Returns `None` when the levels cannot absorb the full amount.
#[must_use]
pub fn average_fill_price(levels: &[PriceLevel], amount: Decimal) -> Option<Decimal> {
    if amount <= Decimal::ZERO {
        return None;
    }
    let mut remaining = amount;
    let mut notional = Decimal::ZERO;
    for level in levels {
        let take = remaining.min(level.quantity);
        notional += take * level.price;
        remaining -= take;
        if remaining.is_zero() {
            return Some(notional / amount);
        }
    }
    None
}

/// Book maintained from a snapshot followed by incremental level updates.
///
/// A zero quantity removes the level.
#[derive(Debug, Clone, Default)]
pub struct LocalBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl LocalBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the book contents with a snapshot.
    pub fn reset<B, A>(&mut self, bids: B, asks: A)
    where
        B: IntoIterator<Item = PriceLevel>,
        A: IntoIterator<Item = PriceLevel>,
    {
        self.bids.clear();
        self.asks.clear();
        for level in bids {
            self.apply(Side::Buy, level);
        }
        for level in asks {
            self.apply(Side::Sell, level);
        }
    }

    /// Apply one level update; `Side::Buy` addresses bids.
    pub fn apply(&mut self, side: Side, level: PriceLevel) {
        let book = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if level.quantity.is_zero() {
            book.remove(&level.price);
        } else {
            book.insert(level.price, level.quantity);
        }
    }

    /// Materialise the best `depth` levels of each side.
    #[must_use]
    pub fn snapshot(&self, venue: VenueId, symbol: Symbol, depth: usize) -> OrderBook {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(p, q)| PriceLevel::new(*p, *q))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(p, q)| PriceLevel::new(*p, *q))
            .collect();
        OrderBook::new(venue, symbol, bids, asks)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Drop levels beyond the best `depth` on each side.
    pub fn truncate(&mut self, depth: usize) {
        while self.bids.len() > depth {
            self.bids.pop_first();
        }
        while self.asks.len() > depth {
            self.asks.pop_last();
        }
    }
}
