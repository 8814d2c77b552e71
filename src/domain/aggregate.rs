//! Cross-venue views derived from per-venue snapshots.
//!
//! All functions here are pure reductions: the caller gathers tickers, books
//! or balances from each venue and the result is recomputed from scratch on
//! every call.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::balance::Balance;
use super::book::OrderBook;
use super::id::{Symbol, VenueId};
use super::ticker::Ticker;

/// One venue's contribution to an aggregated ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueQuote {
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A price together with the venue quoting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestQuote {
    pub venue: VenueId,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedTicker {
    pub symbol: Symbol,
    pub venues: BTreeMap<VenueId, VenueQuote>,
    /// Highest bid across venues.
    pub best_bid: Option<BestQuote>,
    /// Lowest ask across venues.
    pub best_ask: Option<BestQuote>,
    /// `best_ask - best_bid`; negative when venues are crossed.
    pub spread: Option<Decimal>,
    /// Volume-weighted last price, `None` when no venue reports volume.
    pub vwap: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl AggregatedTicker {
    /// Whether some venue bids above another venue's ask.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        self.spread.is_some_and(|s| s < Decimal::ZERO)
    }
}

/// Combine per-venue tickers for one symbol. Returns `None` for no input.
#[must_use]
pub fn aggregate_tickers(symbol: &Symbol, tickers: &[Ticker]) -> Option<AggregatedTicker> {
    if tickers.is_empty() {
        return None;
    }

    let best_bid = tickers
        .iter()
        .filter(|t| t.bid > Decimal::ZERO)
        .max_by_key(|t| t.bid)
        .map(|t| BestQuote {
            venue: t.venue,
            price: t.bid,
        });
    let best_ask = tickers
        .iter()
        .filter(|t| t.ask > Decimal::ZERO)
        .min_by_key(|t| t.ask)
        .map(|t| BestQuote {
            venue: t.venue,
            price: t.ask,
        });
    let spread = best_bid
        .zip(best_ask)
        .map(|(bid, ask)| ask.price - bid.price);

    let total_volume: Decimal = tickers.iter().map(|t| t.volume).sum();
    let vwap = (total_volume > Decimal::ZERO).then(|| {
        let weighted: Decimal = tickers.iter().map(|t| t.last * t.volume).sum();
        weighted / total_volume
    });

    let venues = tickers
        .iter()
        .map(|t| {
            (
                t.venue,
                VenueQuote {
                    last: t.last,
                    bid: t.bid,
                    ask: t.ask,
                    volume: t.volume,
                    timestamp: t.timestamp,
                },
            )
        })
        .collect();

    Some(AggregatedTicker {
        symbol: symbol.clone(),
        venues,
        best_bid,
        best_ask,
        spread,
        vwap,
        timestamp: Utc::now(),
    })
}

/// A book level tagged with its source venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedLevel {
    pub venue: VenueId,
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedOrderBook {
    pub symbol: Symbol,
    pub venues: Vec<VenueId>,
    /// All venues' bids, price descending.
    pub bids: Vec<AggregatedLevel>,
    /// All venues' asks, price ascending.
    pub asks: Vec<AggregatedLevel>,
    pub total_bid_volume: Decimal,
    pub total_ask_volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl AggregatedOrderBook {
    #[must_use]
    pub fn best_bid(&self) -> Option<&AggregatedLevel> {
        self.bids.first()
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<&AggregatedLevel> {
        self.asks.first()
    }

    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }
}

/// Merge per-venue books. Returns `None` for no input.
#[must_use]
pub fn aggregate_order_books(symbol: &Symbol, books: &[OrderBook]) -> Option<AggregatedOrderBook> {
    if books.is_empty() {
        return None;
    }

    let tag = |venue: VenueId| {
        move |l: &super::book::PriceLevel| AggregatedLevel {
            venue,
            price: l.price,
            quantity: l.quantity,
        }
    };

    let mut bids: Vec<_> = books
        .iter()
        .flat_map(|b| b.bids.iter().map(tag(b.venue)))
        .collect();
    let mut asks: Vec<_> = books
        .iter()
        .flat_map(|b| b.asks.iter().map(tag(b.venue)))
        .collect();
    bids.sort_by_key(|l| Reverse(l.price));
    asks.sort_by_key(|l| l.price);

    Some(AggregatedOrderBook {
        symbol: symbol.clone(),
        venues: books.iter().map(|b| b.venue).collect(),
        total_bid_volume: bids.iter().map(|l| l.quantity).sum(),
        total_ask_volume: asks.iter().map(|l| l.quantity).sum(),
        bids,
        asks,
        timestamp: Utc::now(),
    })
}

/// One venue's share of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueHolding {
    pub free: Decimal,
    pub locked: Decimal,
    pub total: Decimal,
    /// Percentage of the asset's total held on this venue.
    pub allocation_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
    pub total: Decimal,
    pub venues: BTreeMap<VenueId, VenueHolding>,
}

/// Merge balances from all venues by asset, sorted by asset name.
///
/// Empty balances are ignored.
#[must_use]
pub fn aggregate_balances(balances: &[Balance]) -> Vec<PortfolioBalance> {
    let mut by_asset: BTreeMap<&str, Vec<&Balance>> = BTreeMap::new();
    for balance in balances.iter().filter(|b| !b.is_empty()) {
        by_asset.entry(balance.asset.as_str()).or_default().push(balance);
    }

    by_asset
        .into_iter()
        .map(|(asset, entries)| {
            let total: Decimal = entries.iter().map(|b| b.total).sum();
            let mut venues: BTreeMap<VenueId, VenueHolding> = BTreeMap::new();
            for b in &entries {
                let holding = venues.entry(b.venue).or_insert(VenueHolding {
                    free: Decimal::ZERO,
                    locked: Decimal::ZERO,
                    total: Decimal::ZERO,
                    allocation_pct: Decimal::ZERO,
                });
                holding.free += b.free;
                holding.locked += b.locked;
                holding.total += b.total;
            }
            for holding in venues.values_mut() {
                holding.allocation_pct = holding.total / total * Decimal::ONE_HUNDRED;
            }
            PortfolioBalance {
                asset: asset.to_string(),
                free: entries.iter().map(|b| b.free).sum(),
                locked: entries.iter().map(|b| b.locked).sum(),
                total,
                venues,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::book::PriceLevel;

    fn ticker(venue: VenueId, bid: Decimal, ask: Decimal, last: Decimal, volume: Decimal) -> Ticker {
        Ticker {
            venue,
            symbol: Symbol::new("BTCUSDT"),
            last,
            bid,
            ask,
            high: ask,
            low: bid,
            volume,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn best_bid_is_max_and_best_ask_is_min() {
        let tickers = vec![
            ticker(VenueId::Binance, dec!(100), dec!(101), dec!(100.5), dec!(10)),
            ticker(VenueId::Coinbase, dec!(102), dec!(103), dec!(102.5), dec!(5)),
            ticker(VenueId::Kraken, dec!(99), dec!(100.5), dec!(100), dec!(5)),
        ];

        let agg = aggregate_tickers(&Symbol::new("BTCUSDT"), &tickers).unwrap();

        let max_bid = tickers.iter().map(|t| t.bid).max().unwrap();
        let min_ask = tickers.iter().map(|t| t.ask).min().unwrap();
        assert_eq!(agg.best_bid.unwrap().price, max_bid);
        assert_eq!(agg.best_bid.unwrap().venue, VenueId::Coinbase);
        assert_eq!(agg.best_ask.unwrap().price, min_ask);
        assert_eq!(agg.best_ask.unwrap().venue, VenueId::Kraken);
        assert_eq!(agg.spread, Some(dec!(-1.5)));
        assert!(agg.is_crossed());
        assert_eq!(agg.venues.len(), 3);
    }

    #[test]
    fn vwap_weights_last_by_volume() {
        let tickers = vec![
            ticker(VenueId::Binance, dec!(99), dec!(101), dec!(100), dec!(3)),
            ticker(VenueId::Kraken, dec!(103), dec!(105), dec!(104), dec!(1)),
        ];
        let agg = aggregate_tickers(&Symbol::new("BTCUSDT"), &tickers).unwrap();
        assert_eq!(agg.vwap, Some(dec!(101)));
    }

    #[test]
    fn vwap_absent_without_volume() {
        let tickers = vec![ticker(VenueId::Binance, dec!(1), dec!(2), dec!(1.5), Decimal::ZERO)];
        let agg = aggregate_tickers(&Symbol::new("BTCUSDT"), &tickers).unwrap();
        assert_eq!(agg.vwap, None);
    }

    #[test]
    fn no_tickers_no_aggregate() {
        assert!(aggregate_tickers(&Symbol::new("BTCUSDT"), &[]).is_none());
    }

    #[test]
    fn books_merge_sorted_and_tagged() {
        let symbol = Symbol::new("BTCUSDT");
        let a = OrderBook::new(
            VenueId::Binance,
            symbol.clone(),
            vec![PriceLevel::new(dec!(100), dec!(1)), PriceLevel::new(dec!(98), dec!(1))],
            vec![PriceLevel::new(dec!(101), dec!(2))],
        );
        let b = OrderBook::new(
            VenueId::Kraken,
            symbol.clone(),
            vec![PriceLevel::new(dec!(99), dec!(3))],
            vec![PriceLevel::new(dec!(100.5), dec!(1)), PriceLevel::new(dec!(102), dec!(1))],
        );

        let agg = aggregate_order_books(&symbol, &[a, b]).unwrap();

        let bids: Vec<_> = agg.bids.iter().map(|l| (l.venue, l.price)).collect();
        assert_eq!(
            bids,
            vec![
                (VenueId::Binance, dec!(100)),
                (VenueId::Kraken, dec!(99)),
                (VenueId::Binance, dec!(98)),
            ]
        );
        assert_eq!(agg.best_ask().unwrap().venue, VenueId::Kraken);
        assert_eq!(agg.total_bid_volume, dec!(5));
        assert_eq!(agg.total_ask_volume, dec!(4));
        assert_eq!(agg.spread(), Some(dec!(0.5)));
    }

    #[test]
    fn balances_merge_with_allocation() {
        let balances = vec![
            Balance::new(VenueId::Binance, "BTC", dec!(1.0), Decimal::ZERO),
            Balance::new(VenueId::Coinbase, "BTC", dec!(0.5), Decimal::ZERO),
            Balance::new(VenueId::Coinbase, "ETH", Decimal::ZERO, Decimal::ZERO),
        ];

        let portfolio = aggregate_balances(&balances);

        assert_eq!(portfolio.len(), 1);
        let btc = &portfolio[0];
        assert_eq!(btc.total, dec!(1.5));
        assert_eq!(btc.venues[&VenueId::Binance].allocation_pct.round_dp(2), dec!(66.67));
        assert_eq!(btc.venues[&VenueId::Coinbase].allocation_pct.round_dp(2), dec!(33.33));
    }
}
