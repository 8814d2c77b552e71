#![allow(dead_code)]
//! Scenario builders shared by the integration tests.

pub mod architecture;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use venuebridge::domain::{FeeSchedule, Symbol, VenueId};
use venuebridge::testkit::connector::MockConnector;
use venuebridge::testkit::domain::{book, btc, ticker};

/// Maker and taker fee of every [`quoted`] venue.
pub const FEE_RATE: Decimal = dec!(0.001);

/// A venue quoting `bid`/`ask` for BTCUSDT, with `depth` base units resting
/// at each touch and [`FEE_RATE`] charged on fills.
pub fn quoted(venue: VenueId, bid: Decimal, ask: Decimal, depth: Decimal) -> MockConnector {
    MockConnector::new(venue)
        .with_fees(FeeSchedule::new(FEE_RATE, FEE_RATE))
        .with_ticker(ticker(venue, btc(), bid, ask))
        .with_book(book(venue, btc(), &[(bid, depth)], &[(ask, depth)]))
}

pub fn symbols(raw: &[&str]) -> Vec<Symbol> {
    raw.iter().map(|s| Symbol::new(s)).collect()
}
