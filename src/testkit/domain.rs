//! Builders for domain primitives used across tests.
//!
//! Concise factory functions for tickers, books, balances, orders and fills
//! so tests focus on assertions rather than construction boilerplate.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::order::OrderSnapshot;
use crate::domain::{
    Balance, Fee, Order, OrderBook, OrderId, OrderStatus, OrderType, PriceLevel, Side, Symbol,
    Ticker, Trade, VenueId,
};

/// `BTCUSDT`, the symbol most tests trade.
pub fn btc() -> Symbol {
    Symbol::new("BTCUSDT")
}

/// Ticker with the given touch; last is the mid, volume is one.
pub fn ticker(venue: VenueId, symbol: Symbol, bid: Decimal, ask: Decimal) -> Ticker {
    let mid = (bid + ask) / Decimal::TWO;
    Ticker {
        venue,
        symbol,
        last: mid,
        bid,
        ask,
        high: ask,
        low: bid,
        volume: Decimal::ONE,
        timestamp: Utc::now(),
    }
}

/// Same as [`ticker`] with an explicit volume.
pub fn ticker_with_volume(
    venue: VenueId,
    symbol: Symbol,
    bid: Decimal,
    ask: Decimal,
    volume: Decimal,
) -> Ticker {
    Ticker {
        volume,
        ..ticker(venue, symbol, bid, ask)
    }
}

/// Build price levels from `(price, quantity)` pairs.
pub fn levels(pairs: &[(Decimal, Decimal)]) -> Vec<PriceLevel> {
    pairs.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect()
}

pub fn book(
    venue: VenueId,
    symbol: Symbol,
    bids: &[(Decimal, Decimal)],
    asks: &[(Decimal, Decimal)],
) -> OrderBook {
    OrderBook::new(venue, symbol, levels(bids), levels(asks))
}

pub fn balance(venue: VenueId, asset: &str, free: Decimal) -> Balance {
    Balance::new(venue, asset, free, Decimal::ZERO)
}

/// A fully filled market order on `BTCUSDT`.
pub fn filled_order(venue: VenueId, id: &str, side: Side, amount: Decimal, price: Decimal) -> Order {
    order(venue, id, side, amount, price, OrderStatus::Closed)
}

/// A resting limit order on `BTCUSDT`.
pub fn open_order(venue: VenueId, id: &str, side: Side, amount: Decimal, price: Decimal) -> Order {
    order(venue, id, side, amount, price, OrderStatus::Open)
}

fn order(
    venue: VenueId,
    id: &str,
    side: Side,
    amount: Decimal,
    price: Decimal,
    status: OrderStatus,
) -> Order {
    let now = Utc::now();
    let filled = if status == OrderStatus::Closed { amount } else { Decimal::ZERO };
    let snapshot = OrderSnapshot {
        venue,
        id: OrderId::new(id),
        client_id: None,
        symbol: btc(),
        order_type: if status == OrderStatus::Closed { OrderType::Market } else { OrderType::Limit },
        side,
        amount,
        price: Some(price),
        average: (filled > Decimal::ZERO).then_some(price),
        filled,
        status,
        fee: None,
        created_at: now,
        updated_at: now,
    };
    match Order::new(snapshot) {
        Ok(order) => order,
        Err(err) => panic!("invalid test order: {err}"),
    }
}

pub fn trade(venue: VenueId, id: &str, symbol: Symbol, price: Decimal, amount: Decimal) -> Trade {
    Trade {
        venue,
        id: id.to_string(),
        order_id: None,
        symbol,
        side: Side::Buy,
        price,
        amount,
        fee: Some(Fee {
            cost: Decimal::ZERO,
            asset: "USDT".into(),
        }),
        is_maker: Some(false),
        timestamp: Utc::now(),
    }
}
