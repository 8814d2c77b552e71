//! Conversion between Kraken payloads and domain types.

use std::collections::BTreeMap;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::dto::{AssetPair, BalanceEntry, DepthInfo, Envelope, OrderInfo, PairRows, TickerInfo, TradeInfo};
use crate::adapter::outbound::shared::wire::{decimal, decimal_at, opt_decimal, seconds_value};
use crate::adapter::outbound::shared::{classify_status, AssetMap, SymbolMap};
use crate::domain::order::OrderSnapshot;
use crate::domain::{
    Balance, Candle, Fee, Market, Order, OrderId, OrderBook, OrderRequest, OrderStatus, OrderType,
    PriceLevel, Side, Symbol, Ticker, TimeInForce, Timeframe, Trade, VenueId,
};
use crate::error::VenueError;

const VENUE: VenueId = VenueId::Kraken;

/// Classify the envelope's error list, e.g. `["EOrder:Insufficient funds"]`.
#[must_use]
pub fn classify_messages(errors: &[String]) -> VenueError {
    let message = errors.join("; ");
    let first = errors.first().map_or("", String::as_str);
    if first.contains("Rate limit") || first.starts_with("EGeneral:Too many requests") {
        VenueError::RateLimited(message)
    } else if first.starts_with("EAPI:Invalid key")
        || first.starts_with("EAPI:Invalid signature")
        || first.starts_with("EAPI:Invalid nonce")
        || first.starts_with("EGeneral:Permission denied")
    {
        VenueError::Authentication(message)
    } else if first.starts_with("EService:") || first.starts_with("EGeneral:Internal error") {
        VenueError::Server {
            status: 503,
            message,
        }
    } else {
        VenueError::rejected(message)
    }
}

/// Map a non-success HTTP response, preferring the envelope's errors.
#[must_use]
pub fn classify_error(status: u16, body: &str) -> VenueError {
    match serde_json::from_str::<Envelope<Value>>(body) {
        Ok(envelope) if !envelope.error.is_empty() && status < 500 && status != 429 => {
            classify_messages(&envelope.error)
        }
        _ => classify_status(status, body),
    }
}

/// Unwrap `{"error": [], "result": ...}`.
pub fn unwrap<T: DeserializeOwned>(body: &str) -> Result<T, VenueError> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;
    if !envelope.error.is_empty() {
        return Err(classify_messages(&envelope.error));
    }
    envelope
        .result
        .ok_or_else(|| VenueError::decode("response has neither result nor error"))
}

/// Result maps are keyed by pair name; single-pair queries carry one entry
/// besides the `last` cursor.
pub fn only_entry<V>(result: &BTreeMap<String, V>) -> Result<&V, VenueError> {
    result
        .iter()
        .find(|(key, _)| key.as_str() != "last")
        .map(|(_, value)| value)
        .ok_or_else(|| VenueError::decode("result holds no pair"))
}

pub fn market(pair: &AssetPair, symbols: &SymbolMap, assets: &AssetMap) -> Result<Market, VenueError> {
    Ok(Market {
        symbol: symbols.from_venue(&pair.altname),
        venue_symbol: pair.altname.clone(),
        base: assets.normalize(&pair.base),
        quote: assets.normalize(&pair.quote),
        active: pair.status.as_deref().map_or(true, |s| s == "online"),
        price_precision: pair.pair_decimals,
        amount_precision: pair.lot_decimals,
        min_amount: opt_decimal("ordermin", pair.ordermin.as_deref())?,
        max_amount: None,
        min_notional: opt_decimal("costmin", pair.costmin.as_deref())?,
    })
}

fn field_at(info: &Value, key: &str, index: usize) -> Result<Decimal, VenueError> {
    let values = info
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| VenueError::Decode(format!("{key}: missing array")))?;
    decimal_at(key, values, index)
}

/// Ticker from REST or WebSocket data; both use the lettered layout.
pub fn ticker(info: &TickerInfo, symbol: Symbol) -> Result<Ticker, VenueError> {
    Ok(Ticker {
        venue: VENUE,
        symbol,
        last: field_at(info, "c", 0)?,
        bid: field_at(info, "b", 0)?,
        ask: field_at(info, "a", 0)?,
        high: field_at(info, "h", 1)?,
        low: field_at(info, "l", 1)?,
        volume: field_at(info, "v", 1)?,
        timestamp: Utc::now(),
    })
}

/// `[price, volume, ...]` rows.
pub fn levels(field: &str, rows: &[Vec<Value>]) -> Result<Vec<PriceLevel>, VenueError> {
    rows.iter()
        .map(|row| Ok(PriceLevel::new(decimal_at(field, row, 0)?, decimal_at(field, row, 1)?)))
        .collect()
}

pub fn order_book(depth: &DepthInfo, symbol: Symbol) -> Result<OrderBook, VenueError> {
    Ok(OrderBook::new(
        VENUE,
        symbol,
        levels("bids", &depth.bids)?,
        levels("asks", &depth.asks)?,
    ))
}

/// Rows under the single pair key of a `Trades` or `OHLC` result.
pub fn pair_rows(result: &PairRows) -> Result<Vec<Vec<Value>>, VenueError> {
    let rows = only_entry(result)?;
    Ok(serde_json::from_value(rows.clone())?)
}

fn taker_side(raw: &Value) -> Result<Side, VenueError> {
    match raw.as_str() {
        Some("b") => Ok(Side::Buy),
        Some("s") => Ok(Side::Sell),
        _ => Err(VenueError::Decode(format!("side: unknown value {raw}"))),
    }
}

/// Trade row `[price, volume, time, side, type, misc, trade_id?]`. Rows
/// without an id get one derived from their time and position.
pub fn public_trade(row: &[Value], symbol: Symbol, index: usize) -> Result<Trade, VenueError> {
    let time = row
        .get(2)
        .ok_or_else(|| VenueError::decode("trade: missing time"))?;
    let timestamp = seconds_value("time", time)?;
    let id = row
        .get(6)
        .and_then(Value::as_u64)
        .map_or_else(|| format!("{}-{index}", timestamp.timestamp_millis()), |id| id.to_string());
    Ok(Trade {
        venue: VENUE,
        id,
        order_id: None,
        symbol,
        side: taker_side(row.get(3).unwrap_or(&Value::Null))?,
        price: decimal_at("price", row, 0)?,
        amount: decimal_at("volume", row, 1)?,
        fee: None,
        is_maker: None,
        timestamp,
    })
}

/// REST row `[time, open, high, low, close, vwap, volume, count]`.
pub fn candle(row: &[Value]) -> Result<Candle, VenueError> {
    let time = row
        .first()
        .ok_or_else(|| VenueError::decode("candle: empty row"))?;
    Ok(Candle {
        open_time: seconds_value("time", time)?,
        open: decimal_at("open", row, 1)?,
        high: decimal_at("high", row, 2)?,
        low: decimal_at("low", row, 3)?,
        close: decimal_at("close", row, 4)?,
        volume: decimal_at("volume", row, 6)?,
    })
}

/// WebSocket row `[time, etime, open, high, low, close, vwap, volume, count]`,
/// where `etime` closes the interval.
pub fn ws_candle(row: &[Value], timeframe: Timeframe) -> Result<Candle, VenueError> {
    let end = row
        .get(1)
        .ok_or_else(|| VenueError::decode("ohlc: missing etime"))?;
    let minutes = i64::try_from(timeframe.minutes()).unwrap_or_default();
    Ok(Candle {
        open_time: seconds_value("etime", end)? - ChronoDuration::minutes(minutes),
        open: decimal_at("open", row, 2)?,
        high: decimal_at("high", row, 3)?,
        low: decimal_at("low", row, 4)?,
        close: decimal_at("close", row, 5)?,
        volume: decimal_at("volume", row, 7)?,
    })
}

/// OHLC interval in minutes. Kraken has no 6 hour candles.
pub fn interval(timeframe: Timeframe) -> Result<u64, VenueError> {
    match timeframe {
        Timeframe::H6 => Err(VenueError::Unsupported("kraken has no 6h candles".into())),
        other => Ok(other.minutes()),
    }
}

/// Timeframe for an `ohlc-<minutes>` channel.
#[must_use]
pub fn timeframe_from_minutes(minutes: u64) -> Option<Timeframe> {
    Timeframe::ALL.into_iter().find(|tf| tf.minutes() == minutes)
}

pub fn balances(
    entries: &BTreeMap<String, BalanceEntry>,
    assets: &AssetMap,
) -> Result<Vec<Balance>, VenueError> {
    let mut balances = Vec::with_capacity(entries.len());
    for (asset, entry) in entries {
        let total = decimal("balance", &entry.balance)?;
        let held = opt_decimal("hold_trade", entry.hold_trade.as_deref())?.unwrap_or_default();
        let balance = Balance::new(VENUE, assets.normalize(asset), total - held, held);
        if !balance.is_empty() {
            balances.push(balance);
        }
    }
    Ok(balances)
}

pub fn side(raw: &str) -> Result<Side, VenueError> {
    match raw {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(VenueError::Decode(format!("type: unknown value {other:?}"))),
    }
}

const fn side_name(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

pub fn order_type(raw: &str) -> Result<OrderType, VenueError> {
    Ok(match raw {
        "market" => OrderType::Market,
        "limit" => OrderType::Limit,
        "stop-loss" => OrderType::StopMarket,
        "stop-loss-limit" => OrderType::StopLimit,
        "take-profit" => OrderType::TakeProfitMarket,
        "take-profit-limit" => OrderType::TakeProfitLimit,
        other => return Err(VenueError::Decode(format!("ordertype: unknown value {other:?}"))),
    })
}

const fn order_type_name(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
        OrderType::StopMarket => "stop-loss",
        OrderType::StopLimit => "stop-loss-limit",
        OrderType::TakeProfitMarket => "take-profit",
        OrderType::TakeProfitLimit => "take-profit-limit",
    }
}

pub fn status(raw: &str) -> Result<OrderStatus, VenueError> {
    Ok(match raw {
        "pending" => OrderStatus::Pending,
        "open" => OrderStatus::Open,
        "closed" => OrderStatus::Closed,
        "canceled" => OrderStatus::Canceled,
        "expired" => OrderStatus::Expired,
        other => return Err(VenueError::Decode(format!("status: unknown value {other:?}"))),
    })
}

fn number(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Form parameters for `AddOrder`, without the nonce.
///
/// Trigger orders carry the trigger in `price` and any limit in `price2`.
pub fn order_params(
    request: &OrderRequest,
    pair: &str,
    client_id: &str,
) -> Result<Vec<(&'static str, String)>, VenueError> {
    let time_in_force = match request.time_in_force {
        TimeInForce::Gtc => "GTC",
        TimeInForce::Ioc => "IOC",
        TimeInForce::Fok => {
            return Err(VenueError::Unsupported(
                "kraken does not support fill-or-kill orders".into(),
            ))
        }
    };
    let mut params = vec![
        ("ordertype", order_type_name(request.order_type).to_string()),
        ("type", side_name(request.side).to_string()),
        ("volume", number(request.amount)),
        ("pair", pair.to_string()),
    ];
    match (request.order_type.requires_stop_price(), request.stop_price, request.price) {
        (true, Some(trigger), limit) => {
            params.push(("price", number(trigger)));
            if let Some(limit) = limit.filter(|_| request.order_type.requires_price()) {
                params.push(("price2", number(limit)));
            }
        }
        (false, _, Some(price)) if request.order_type.requires_price() => {
            params.push(("price", number(price)));
        }
        _ => {}
    }
    if request.order_type.requires_price() {
        params.push(("timeinforce", time_in_force.to_string()));
    }
    params.push(("cl_ord_id", client_id.to_string()));
    Ok(params)
}

fn quote_of(symbol: &Symbol) -> String {
    symbol.split().map_or_else(String::new, |(_, quote)| quote.to_string())
}

fn non_zero(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| !v.is_zero())
}

pub fn order(txid: &str, info: &OrderInfo, symbol: Symbol) -> Result<Order, VenueError> {
    let order_type = order_type(&info.descr.ordertype)?;
    let filled = decimal("vol_exec", &info.vol_exec)?;
    let limit = if order_type.requires_stop_price() {
        info.descr.price2.as_deref()
    } else {
        info.descr.price.as_deref()
    };
    let price = non_zero(opt_decimal("price", limit)?).filter(|_| order_type.requires_price());
    let average = non_zero(opt_decimal("price", info.price.as_deref())?).filter(|_| filled > Decimal::ZERO);
    let fee = non_zero(opt_decimal("fee", info.fee.as_deref())?).map(|cost| Fee {
        cost,
        asset: quote_of(&symbol),
    });
    let created_at = seconds_value("opentm", &Value::from(info.opentm))?;
    let updated_at = info
        .closetm
        .map(|t| seconds_value("closetm", &Value::from(t)))
        .transpose()?
        .unwrap_or(created_at);

    Order::new(OrderSnapshot {
        venue: VENUE,
        id: OrderId::new(txid),
        client_id: info.cl_ord_id.clone(),
        symbol,
        order_type,
        side: side(&info.descr.side)?,
        amount: decimal("vol", &info.vol)?,
        price,
        average,
        filled,
        status: status(&info.status)?,
        fee,
        created_at,
        updated_at,
    })
    .map_err(|e| VenueError::Decode(e.to_string()))
}

/// Acknowledged order whose details could not be read back yet.
pub fn pending_order(txid: &str, request: &OrderRequest, client_id: &str) -> Result<Order, VenueError> {
    let now = Utc::now();
    Order::new(OrderSnapshot {
        venue: VENUE,
        id: OrderId::new(txid),
        client_id: Some(client_id.to_string()),
        symbol: request.symbol.clone(),
        order_type: request.order_type,
        side: request.side,
        amount: request.amount,
        price: request.price,
        average: None,
        filled: Decimal::ZERO,
        status: OrderStatus::Pending,
        fee: None,
        created_at: now,
        updated_at: now,
    })
    .map_err(|e| VenueError::Decode(e.to_string()))
}

pub fn trade(id: &str, info: &TradeInfo, symbol: Symbol) -> Result<Trade, VenueError> {
    let fee = decimal("fee", &info.fee)?;
    Ok(Trade {
        venue: VENUE,
        id: id.to_string(),
        order_id: Some(OrderId::new(info.ordertxid.clone())),
        side: side(&info.side)?,
        price: decimal("price", &info.price)?,
        amount: decimal("vol", &info.vol)?,
        fee: Some(Fee {
            cost: fee,
            asset: quote_of(&symbol),
        }),
        is_maker: info.maker,
        timestamp: seconds_value("time", &Value::from(info.time))?,
        symbol,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::adapter::outbound::kraken::symbols::{asset_map, rest_map};

    #[test]
    fn envelope_errors_become_venue_errors() {
        let err = unwrap::<Value>(r#"{"error":["EOrder:Insufficient funds"]}"#).unwrap_err();
        assert_eq!(err, VenueError::rejected("EOrder:Insufficient funds"));

        let err = unwrap::<Value>(r#"{"error":["EAPI:Rate limit exceeded"]}"#).unwrap_err();
        assert!(err.is_transient());

        let err = unwrap::<Value>(r#"{"error":["EAPI:Invalid key"]}"#).unwrap_err();
        assert!(matches!(err, VenueError::Authentication(_)));

        let err = unwrap::<Value>(r#"{"error":["EService:Unavailable"]}"#).unwrap_err();
        assert!(matches!(err, VenueError::Server { .. }));

        assert_eq!(unwrap::<u32>(r#"{"error":[],"result":7}"#).unwrap(), 7);
    }

    #[test]
    fn ticker_reads_rest_and_stream_layouts() {
        let rest = json!({
            "a": ["52609.60000", "1", "1.000"], "b": ["52609.50000", "1", "1.000"],
            "c": ["52641.10000", "0.00080000"], "v": ["1920.8", "7954.0"],
            "l": ["51513.9", "51513.9"], "h": ["53219.9", "57200.0"]
        });
        let ticker = ticker(&rest, Symbol::new("BTCUSDT")).unwrap();
        assert_eq!(ticker.ask, dec!(52609.6));
        assert_eq!(ticker.high, dec!(57200));
        assert_eq!(ticker.volume, dec!(7954));

        let stream = json!({
            "a": ["5525.40000", 1, "1.000"], "b": ["5525.10000", 1, "1.000"],
            "c": ["5525.10000", "0.00398963"], "v": ["2634.1", "3000.2"],
            "l": ["5505.0", "5505.0"], "h": ["5783.0", "5783.0"]
        });
        assert_eq!(super::ticker(&stream, Symbol::new("BTCUSDT")).unwrap().bid, dec!(5525.1));
    }

    #[test]
    fn balances_split_held_amounts() {
        let entries: BTreeMap<String, BalanceEntry> = serde_json::from_value(json!({
            "XXBT": {"balance": "1.5", "hold_trade": "0.5"},
            "ZUSD": {"balance": "100.00"},
            "XETH": {"balance": "0.0"}
        }))
        .unwrap();
        let balances = balances(&entries, &asset_map()).unwrap();
        assert_eq!(balances.len(), 2);
        let btc = balances.iter().find(|b| b.asset == "BTC").unwrap();
        assert_eq!(btc.free, dec!(1.0));
        assert_eq!(btc.locked, dec!(0.5));
        assert!(balances.iter().any(|b| b.asset == "USDT" && b.total == dec!(100)));
    }

    #[test]
    fn stop_limit_params_carry_trigger_and_limit() {
        let mut request = OrderRequest::limit(Symbol::new("BTCUSDT"), Side::Sell, dec!(1.25), dec!(37000));
        request.order_type = OrderType::StopLimit;
        request.stop_price = Some(dec!(37500));
        let params = order_params(&request, "XBTUSD", "cid").unwrap();
        assert!(params.contains(&("ordertype", "stop-loss-limit".to_string())));
        assert!(params.contains(&("price", "37500".to_string())));
        assert!(params.contains(&("price2", "37000".to_string())));
        assert!(params.contains(&("timeinforce", "GTC".to_string())));
    }

    #[test]
    fn fill_or_kill_is_unsupported() {
        let mut request = OrderRequest::limit(Symbol::new("BTCUSDT"), Side::Buy, dec!(1), dec!(1));
        request.time_in_force = TimeInForce::Fok;
        assert!(matches!(
            order_params(&request, "XBTUSD", "cid"),
            Err(VenueError::Unsupported(_))
        ));
    }

    #[test]
    fn order_info_converts() {
        let info: OrderInfo = serde_json::from_value(json!({
            "status": "closed", "opentm": 1_616_665_496.7808, "closetm": 1_616_665_499.1922,
            "descr": {"pair": "XBTUSD", "type": "buy", "ordertype": "limit", "price": "37500.0", "price2": "0"},
            "vol": "1.25", "vol_exec": "1.25", "cost": "46875.0", "fee": "75.0", "price": "37500.0"
        }))
        .unwrap();
        let symbol = rest_map().from_venue(&info.descr.pair);
        let order = order("OQCLML-BW3P3-BUCMWZ", &info, symbol).unwrap();
        assert_eq!(order.status(), OrderStatus::Closed);
        assert_eq!(order.symbol.as_str(), "BTCUSDT");
        assert_eq!(order.price, Some(dec!(37500)));
        assert_eq!(order.average, Some(dec!(37500)));
        assert_eq!(order.fee.unwrap().asset, "USDT");
        assert!(order.updated_at > order.created_at);
    }

    #[test]
    fn trade_rows_without_ids_get_derived_ids() {
        let row: Vec<Value> = serde_json::from_value(json!(["30243.4", "0.0004", 1_688_669_597.8277, "b", "m", ""])).unwrap();
        let trade = public_trade(&row, Symbol::new("BTCUSDT"), 3).unwrap();
        assert_eq!(trade.side, Side::Buy);
        assert!(trade.id.ends_with("-3"));
    }

    #[test]
    fn stream_candles_open_one_interval_before_end() {
        let row: Vec<Value> = serde_json::from_value(json!([
            "1542057314.748456", "1542057360.000000", "3586.7", "3586.7", "3586.6", "3586.6",
            "3586.68894", "0.03373000", 2
        ]))
        .unwrap();
        let candle = ws_candle(&row, Timeframe::M1).unwrap();
        assert_eq!(candle.open_time.timestamp(), 1_542_057_300);
        assert_eq!(candle.volume, dec!(0.03373));
    }

    #[test]
    fn six_hour_candles_are_unsupported() {
        assert!(interval(Timeframe::H6).is_err());
        assert_eq!(interval(Timeframe::H4).unwrap(), 240);
        assert_eq!(timeframe_from_minutes(15), Some(Timeframe::M15));
    }
}
