//! Conversion between Coinbase payloads and domain types.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use super::dto::{
    Account, ApiError, Book, CandleRow, FeedMatch, FeedTicker, Fill, OrderResponse, Product,
    ProductStats, ProductTicker, PublicTrade, RawLevel,
};
use crate::adapter::outbound::shared::wire::{decimal, decimal_at, opt_decimal, rfc3339, seconds_value};
use crate::adapter::outbound::shared::{classify_status, SymbolMap};
use crate::domain::market::precision_from_step;
use crate::domain::order::OrderSnapshot;
use crate::domain::{
    Balance, Candle, Fee, Market, Order, OrderBook, OrderId, OrderRequest, OrderStatus, OrderType,
    PriceLevel, Side, Symbol, Ticker, TimeInForce, Timeframe, Trade, VenueId,
};
use crate::error::VenueError;

const VENUE: VenueId = VenueId::Coinbase;

/// Map an error response. Bodies carry `{"message": "..."}`.
#[must_use]
pub fn classify_error(status: u16, body: &str) -> VenueError {
    match serde_json::from_str::<ApiError>(body) {
        Ok(error) => classify_status(status, &error.message),
        Err(_) => classify_status(status, body),
    }
}

pub fn market(product: &Product, symbols: &SymbolMap) -> Result<Market, VenueError> {
    Ok(Market {
        symbol: symbols.from_venue(&product.id),
        venue_symbol: product.id.clone(),
        base: product.base_currency.clone(),
        quote: product.quote_currency.clone(),
        active: product.status == "online" && !product.trading_disabled,
        price_precision: precision_from_step(decimal("quote_increment", &product.quote_increment)?),
        amount_precision: precision_from_step(decimal("base_increment", &product.base_increment)?),
        min_amount: opt_decimal("base_min_size", product.base_min_size.as_deref())?,
        max_amount: opt_decimal("base_max_size", product.base_max_size.as_deref())?,
        min_notional: opt_decimal("min_market_funds", product.min_market_funds.as_deref())?,
    })
}

pub fn ticker(
    dto: &ProductTicker,
    stats: &ProductStats,
    symbol: Symbol,
) -> Result<Ticker, VenueError> {
    Ok(Ticker {
        venue: VENUE,
        symbol,
        last: decimal("price", &dto.price)?,
        bid: decimal("bid", &dto.bid)?,
        ask: decimal("ask", &dto.ask)?,
        high: decimal("high", &stats.high)?,
        low: decimal("low", &stats.low)?,
        volume: decimal("volume", &dto.volume)?,
        timestamp: rfc3339("time", &dto.time)?,
    })
}

fn rest_levels(field: &str, raw: &[RawLevel]) -> Result<Vec<PriceLevel>, VenueError> {
    raw.iter()
        .map(|(price, size, _)| Ok(PriceLevel::new(decimal(field, price)?, decimal(field, size)?)))
        .collect()
}

pub fn order_book(dto: &Book, symbol: Symbol) -> Result<OrderBook, VenueError> {
    Ok(OrderBook::new(
        VENUE,
        symbol,
        rest_levels("bids", &dto.bids)?,
        rest_levels("asks", &dto.asks)?,
    )
    .with_nonce(dto.sequence))
}

pub fn side(raw: &str) -> Result<Side, VenueError> {
    match raw {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(VenueError::Decode(format!("side: unknown value {other:?}"))),
    }
}

const fn side_name(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

/// Public trades and matches report the maker's side; the taker did the opposite.
pub fn public_trade(dto: &PublicTrade, symbol: Symbol) -> Result<Trade, VenueError> {
    Ok(Trade {
        venue: VENUE,
        id: dto.trade_id.to_string(),
        order_id: None,
        symbol,
        side: side(&dto.side)?.opposite(),
        price: decimal("price", &dto.price)?,
        amount: decimal("size", &dto.size)?,
        fee: None,
        is_maker: None,
        timestamp: rfc3339("time", &dto.time)?,
    })
}

pub fn candle(row: &CandleRow) -> Result<Candle, VenueError> {
    let time = row
        .first()
        .ok_or_else(|| VenueError::decode("candle: empty row"))?;
    Ok(Candle {
        open_time: seconds_value("time", time)?,
        low: decimal_at("low", row, 1)?,
        high: decimal_at("high", row, 2)?,
        open: decimal_at("open", row, 3)?,
        close: decimal_at("close", row, 4)?,
        volume: decimal_at("volume", row, 5)?,
    })
}

/// Candle width in seconds; the venue serves six granularities.
pub fn granularity(timeframe: Timeframe) -> Result<u32, VenueError> {
    match timeframe {
        Timeframe::M1 => Ok(60),
        Timeframe::M5 => Ok(300),
        Timeframe::M15 => Ok(900),
        Timeframe::H1 => Ok(3_600),
        Timeframe::H6 => Ok(21_600),
        Timeframe::D1 => Ok(86_400),
        other => Err(VenueError::Unsupported(format!(
            "coinbase has no {} candles",
            other.as_str()
        ))),
    }
}

pub fn balances(accounts: &[Account]) -> Result<Vec<Balance>, VenueError> {
    let mut balances = Vec::with_capacity(accounts.len());
    for account in accounts {
        let free = decimal("available", &account.available)?;
        let locked = decimal("hold", &account.hold)?;
        let balance = Balance::new(VENUE, account.currency.clone(), free, locked);
        if !balance.is_empty() {
            balances.push(balance);
        }
    }
    Ok(balances)
}

/// `stop` direction for trigger orders: `loss` fires as the price falls,
/// `entry` as it rises.
fn stop_direction(order_type: OrderType, side: Side) -> Option<&'static str> {
    let take_profit = matches!(
        order_type,
        OrderType::TakeProfitMarket | OrderType::TakeProfitLimit
    );
    if !order_type.requires_stop_price() {
        return None;
    }
    Some(match (side, take_profit) {
        (Side::Sell, false) | (Side::Buy, true) => "loss",
        (Side::Buy, false) | (Side::Sell, true) => "entry",
    })
}

fn order_type_from(raw: &str, stop: Option<&str>, side: Side) -> Result<OrderType, VenueError> {
    let limit = match raw {
        "limit" => true,
        "market" => false,
        other => return Err(VenueError::Decode(format!("type: unknown value {other:?}"))),
    };
    let take_profit = match (stop, side) {
        (None, _) => return Ok(if limit { OrderType::Limit } else { OrderType::Market }),
        (Some("loss"), Side::Sell) | (Some("entry"), Side::Buy) => false,
        (Some("loss"), Side::Buy) | (Some("entry"), Side::Sell) => true,
        (Some(other), _) => return Err(VenueError::Decode(format!("stop: unknown value {other:?}"))),
    };
    Ok(match (limit, take_profit) {
        (true, false) => OrderType::StopLimit,
        (false, false) => OrderType::StopMarket,
        (true, true) => OrderType::TakeProfitLimit,
        (false, true) => OrderType::TakeProfitMarket,
    })
}

const fn time_in_force_name(tif: TimeInForce) -> &'static str {
    match tif {
        TimeInForce::Gtc => "GTC",
        TimeInForce::Ioc => "IOC",
        TimeInForce::Fok => "FOK",
    }
}

fn number(value: Decimal) -> String {
    value.normalize().to_string()
}

/// JSON body for `POST /orders`.
#[must_use]
pub fn order_body(request: &OrderRequest, product_id: &str, client_id: &str) -> Value {
    let priced = request.order_type.requires_price();
    let mut body = json!({
        "product_id": product_id,
        "side": side_name(request.side),
        "type": if priced { "limit" } else { "market" },
        "size": number(request.amount),
        "client_oid": client_id,
    });
    if priced {
        if let Some(price) = request.price {
            body["price"] = json!(number(price));
        }
        body["time_in_force"] = json!(time_in_force_name(request.time_in_force));
    }
    if let (Some(direction), Some(stop)) = (
        stop_direction(request.order_type, request.side),
        request.stop_price,
    ) {
        body["stop"] = json!(direction);
        body["stop_price"] = json!(number(stop));
    }
    body
}

fn status(dto: &OrderResponse, amount: Decimal, filled: Decimal) -> Result<OrderStatus, VenueError> {
    Ok(match dto.status.as_str() {
        "received" | "pending" => OrderStatus::Pending,
        "open" | "active" => OrderStatus::Open,
        "rejected" => OrderStatus::Rejected,
        "done" => match dto.done_reason.as_deref() {
            Some("filled") => OrderStatus::Closed,
            Some("canceled" | "cancelled") => OrderStatus::Canceled,
            _ if amount > Decimal::ZERO && filled >= amount => OrderStatus::Closed,
            _ => OrderStatus::Canceled,
        },
        other => return Err(VenueError::Decode(format!("status: unknown value {other:?}"))),
    })
}

fn quote_asset(product_id: &str) -> String {
    product_id
        .split_once('-')
        .map_or_else(String::new, |(_, quote)| quote.to_string())
}

pub fn order(dto: &OrderResponse, symbols: &SymbolMap) -> Result<Order, VenueError> {
    let side = side(&dto.side)?;
    let filled = opt_decimal("filled_size", dto.filled_size.as_deref())?.unwrap_or_default();
    // Funds-sized market orders carry no base size until they fill.
    let amount = opt_decimal("size", dto.size.as_deref())?.unwrap_or(filled);
    let executed = opt_decimal("executed_value", dto.executed_value.as_deref())?;
    let average = executed.filter(|_| filled > Decimal::ZERO).map(|v| v / filled);
    let fee = opt_decimal("fill_fees", dto.fill_fees.as_deref())?
        .filter(|f| !f.is_zero())
        .map(|cost| Fee {
            cost,
            asset: quote_asset(&dto.product_id),
        });
    let created_at = rfc3339("created_at", &dto.created_at)?;
    let updated_at = dto
        .done_at
        .as_deref()
        .map(|t| rfc3339("done_at", t))
        .transpose()?
        .unwrap_or(created_at);

    Order::new(OrderSnapshot {
        venue: VENUE,
        id: OrderId::new(dto.id.clone()),
        client_id: dto.client_oid.clone(),
        symbol: symbols.from_venue(&dto.product_id),
        order_type: order_type_from(&dto.order_type, dto.stop.as_deref(), side)?,
        side,
        amount,
        price: opt_decimal("price", dto.price.as_deref())?.filter(|p| !p.is_zero()),
        average,
        filled,
        status: status(dto, amount, filled)?,
        fee,
        created_at,
        updated_at,
    })
    .map_err(|e| VenueError::Decode(e.to_string()))
}

pub fn fill(dto: &Fill, symbols: &SymbolMap) -> Result<Trade, VenueError> {
    Ok(Trade {
        venue: VENUE,
        id: dto.trade_id.to_string(),
        order_id: Some(OrderId::new(dto.order_id.clone())),
        symbol: symbols.from_venue(&dto.product_id),
        side: side(&dto.side)?,
        price: decimal("price", &dto.price)?,
        amount: decimal("size", &dto.size)?,
        fee: Some(Fee {
            cost: decimal("fee", &dto.fee)?,
            asset: quote_asset(&dto.product_id),
        }),
        is_maker: Some(dto.liquidity == "M"),
        timestamp: rfc3339("created_at", &dto.created_at)?,
    })
}

// -----------------------------------------------------------------------------
// Feed
// -----------------------------------------------------------------------------

pub fn feed_ticker(dto: &FeedTicker, symbol: Symbol) -> Result<Ticker, VenueError> {
    Ok(Ticker {
        venue: VENUE,
        symbol,
        last: decimal("price", &dto.price)?,
        bid: decimal("best_bid", &dto.best_bid)?,
        ask: decimal("best_ask", &dto.best_ask)?,
        high: decimal("high_24h", &dto.high_24h)?,
        low: decimal("low_24h", &dto.low_24h)?,
        volume: decimal("volume_24h", &dto.volume_24h)?,
        timestamp: dto
            .time
            .as_deref()
            .map(|t| rfc3339("time", t))
            .transpose()?
            .unwrap_or_else(Utc::now),
    })
}

pub fn feed_match(dto: &FeedMatch, symbol: Symbol) -> Result<Trade, VenueError> {
    Ok(Trade {
        venue: VENUE,
        id: dto.trade_id.to_string(),
        order_id: None,
        symbol,
        side: side(&dto.side)?.opposite(),
        price: decimal("price", &dto.price)?,
        amount: decimal("size", &dto.size)?,
        fee: None,
        is_maker: None,
        timestamp: rfc3339("time", &dto.time)?,
    })
}

pub fn feed_levels(field: &str, raw: &[[String; 2]]) -> Result<Vec<PriceLevel>, VenueError> {
    raw.iter()
        .map(|[price, size]| Ok(PriceLevel::new(decimal(field, price)?, decimal(field, size)?)))
        .collect()
}

/// One `[side, price, size]` change; `buy` addresses bids.
pub fn feed_change(change: &[String; 3]) -> Result<(Side, PriceLevel), VenueError> {
    let [side_raw, price, size] = change;
    Ok((
        side(side_raw)?,
        PriceLevel::new(decimal("price", price)?, decimal("size", size)?),
    ))
}
