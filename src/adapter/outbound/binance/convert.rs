//! Conversion between Binance payloads and domain types.

use chrono::Utc;
use rust_decimal::Decimal;

use super::dto::{
    Account, AccountPosition, AccountTrade, ApiError, Depth, ExecutionReport, Kline, OrderResponse,
    PublicTrade, RawLevel, SymbolFilter, SymbolInfo, Ticker24h, WsKline, WsTicker, WsTrade,
};
use crate::adapter::outbound::shared::wire::{decimal, millis};
use crate::adapter::outbound::shared::{classify_status, SymbolMap};
use crate::domain::market::precision_from_step;
use crate::domain::order::OrderSnapshot;
use crate::domain::{
    Balance, Candle, Fee, Market, Order, OrderBook, OrderId, OrderRequest, OrderStatus, OrderType,
    PriceLevel, Side, Symbol, Ticker, TimeInForce, Trade, VenueId,
};
use crate::error::VenueError;

const VENUE: VenueId = VenueId::Binance;

/// Map an error response. Binance bodies carry `{"code": -2010, "msg": "..."}`.
#[must_use]
pub fn classify_error(status: u16, body: &str) -> VenueError {
    let Ok(error) = serde_json::from_str::<ApiError>(body) else {
        return classify_status(status, body);
    };
    match (status, error.code) {
        (_, -2014 | -2015 | -1022) | (401, _) => VenueError::Authentication(error.msg),
        (418 | 429, _) | (_, -1003) => VenueError::RateLimited(error.msg),
        (500..=599, _) => VenueError::Server {
            status,
            message: error.msg,
        },
        _ => VenueError::Rejected {
            code: Some(error.code.to_string()),
            message: error.msg,
        },
    }
}

pub fn market(info: &SymbolInfo, symbols: &SymbolMap) -> Result<Market, VenueError> {
    let mut market = Market {
        symbol: symbols.from_venue(&info.symbol),
        venue_symbol: info.symbol.clone(),
        base: info.base_asset.clone(),
        quote: info.quote_asset.clone(),
        active: info.status == "TRADING",
        price_precision: 8,
        amount_precision: 8,
        min_amount: None,
        max_amount: None,
        min_notional: None,
    };
    for filter in &info.filters {
        match filter {
            SymbolFilter::Price { tick_size } => {
                market.price_precision = precision_from_step(decimal("tickSize", tick_size)?);
            }
            SymbolFilter::LotSize {
                min_qty,
                max_qty,
                step_size,
            } => {
                market.amount_precision = precision_from_step(decimal("stepSize", step_size)?);
                market.min_amount = Some(decimal("minQty", min_qty)?);
                market.max_amount = Some(decimal("maxQty", max_qty)?);
            }
            SymbolFilter::MinNotional { min_notional } | SymbolFilter::Notional { min_notional } => {
                market.min_notional = Some(decimal("minNotional", min_notional)?);
            }
            SymbolFilter::Other => {}
        }
    }
    Ok(market)
}

pub fn ticker(dto: &Ticker24h, symbol: Symbol) -> Result<Ticker, VenueError> {
    Ok(Ticker {
        venue: VENUE,
        symbol,
        last: decimal("lastPrice", &dto.last_price)?,
        bid: decimal("bidPrice", &dto.bid_price)?,
        ask: decimal("askPrice", &dto.ask_price)?,
        high: decimal("highPrice", &dto.high_price)?,
        low: decimal("lowPrice", &dto.low_price)?,
        volume: decimal("volume", &dto.volume)?,
        timestamp: millis("closeTime", dto.close_time)?,
    })
}

pub fn levels(field: &str, raw: &[RawLevel]) -> Result<Vec<PriceLevel>, VenueError> {
    raw.iter()
        .map(|[price, qty]| Ok(PriceLevel::new(decimal(field, price)?, decimal(field, qty)?)))
        .collect()
}

pub fn order_book(dto: &Depth, symbol: Symbol) -> Result<OrderBook, VenueError> {
    Ok(OrderBook::new(
        VENUE,
        symbol,
        levels("bids", &dto.bids)?,
        levels("asks", &dto.asks)?,
    )
    .with_nonce(dto.last_update_id))
}

pub fn public_trade(dto: &PublicTrade, symbol: Symbol) -> Result<Trade, VenueError> {
    Ok(Trade {
        venue: VENUE,
        id: dto.id.to_string(),
        order_id: None,
        symbol,
        // The taker's side: a maker buyer means the taker sold.
        side: if dto.is_buyer_maker { Side::Sell } else { Side::Buy },
        price: decimal("price", &dto.price)?,
        amount: decimal("qty", &dto.qty)?,
        fee: None,
        is_maker: None,
        timestamp: millis("time", dto.time)?,
    })
}

pub fn candle(row: &Kline) -> Result<Candle, VenueError> {
    Ok(Candle {
        open_time: millis("openTime", row.0)?,
        open: decimal("open", &row.1)?,
        high: decimal("high", &row.2)?,
        low: decimal("low", &row.3)?,
        close: decimal("close", &row.4)?,
        volume: decimal("volume", &row.5)?,
    })
}

/// Non-empty balances of an account.
pub fn balances(account: &Account) -> Result<Vec<Balance>, VenueError> {
    let mut out = Vec::new();
    for b in &account.balances {
        let balance = Balance::new(
            VENUE,
            b.asset.to_ascii_uppercase(),
            decimal("free", &b.free)?,
            decimal("locked", &b.locked)?,
        );
        if !balance.is_empty() {
            out.push(balance);
        }
    }
    Ok(out)
}

pub fn status(raw: &str) -> Result<OrderStatus, VenueError> {
    Ok(match raw {
        "PENDING_NEW" => OrderStatus::Pending,
        // A pending cancel is still live until the venue confirms it.
        "NEW" | "PARTIALLY_FILLED" | "PENDING_CANCEL" => OrderStatus::Open,
        "FILLED" => OrderStatus::Closed,
        "CANCELED" => OrderStatus::Canceled,
        "REJECTED" => OrderStatus::Rejected,
        "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
        other => return Err(VenueError::Decode(format!("status: unknown value {other:?}"))),
    })
}

pub fn side(raw: &str) -> Result<Side, VenueError> {
    match raw {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(VenueError::Decode(format!("side: unknown value {other:?}"))),
    }
}

pub fn order_type(raw: &str) -> Result<OrderType, VenueError> {
    Ok(match raw {
        "MARKET" => OrderType::Market,
        "LIMIT" | "LIMIT_MAKER" => OrderType::Limit,
        "STOP_LOSS" => OrderType::StopMarket,
        "STOP_LOSS_LIMIT" => OrderType::StopLimit,
        "TAKE_PROFIT" => OrderType::TakeProfitMarket,
        "TAKE_PROFIT_LIMIT" => OrderType::TakeProfitLimit,
        other => return Err(VenueError::Decode(format!("type: unknown value {other:?}"))),
    })
}

const fn order_type_name(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::StopMarket => "STOP_LOSS",
        OrderType::StopLimit => "STOP_LOSS_LIMIT",
        OrderType::TakeProfitMarket => "TAKE_PROFIT",
        OrderType::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
    }
}

const fn side_name(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
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

/// Parameters for `POST /api/v3/order`, in signing order.
pub fn order_params(
    request: &OrderRequest,
    venue_symbol: &str,
    client_id: &str,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", venue_symbol.to_string()),
        ("side", side_name(request.side).to_string()),
        ("type", order_type_name(request.order_type).to_string()),
        ("quantity", number(request.amount)),
    ];
    if request.order_type.requires_price() {
        params.push(("timeInForce", time_in_force_name(request.time_in_force).to_string()));
    }
    if let Some(price) = request.price.filter(|_| request.order_type.requires_price()) {
        params.push(("price", number(price)));
    }
    if let Some(stop) = request.stop_price.filter(|_| request.order_type.requires_stop_price()) {
        params.push(("stopPrice", number(stop)));
    }
    params.push(("newClientOrderId", client_id.to_string()));
    params.push(("newOrderRespType", "RESULT".to_string()));
    params
}

fn average(filled: Decimal, quote: Option<Decimal>) -> Option<Decimal> {
    let quote = quote?;
    (filled > Decimal::ZERO).then(|| quote / filled)
}

fn non_zero(value: Decimal) -> Option<Decimal> {
    (!value.is_zero()).then_some(value)
}

pub fn order(dto: &OrderResponse, symbol: Symbol) -> Result<Order, VenueError> {
    let filled = decimal("executedQty", &dto.executed_qty)?;
    let quote = dto
        .cummulative_quote_qty
        .as_deref()
        .map(|q| decimal("cummulativeQuoteQty", q))
        .transpose()?;
    let created = dto.time.or(dto.transact_time).map(|t| millis("time", t)).transpose()?;
    let updated = dto
        .update_time
        .or(dto.transact_time)
        .or(dto.time)
        .map(|t| millis("updateTime", t))
        .transpose()?;
    let now = Utc::now();

    Order::new(OrderSnapshot {
        venue: VENUE,
        id: OrderId::new(dto.order_id.to_string()),
        client_id: Some(dto.client_order_id.clone()),
        symbol,
        order_type: order_type(&dto.order_type)?,
        side: side(&dto.side)?,
        amount: decimal("origQty", &dto.orig_qty)?,
        price: non_zero(decimal("price", &dto.price)?),
        average: average(filled, quote),
        filled,
        status: status(&dto.status)?,
        fee: None,
        created_at: created.unwrap_or(now),
        updated_at: updated.or(created).unwrap_or(now),
    })
    .map_err(|e| VenueError::Decode(e.to_string()))
}

pub fn account_trade(dto: &AccountTrade, symbol: Symbol) -> Result<Trade, VenueError> {
    Ok(Trade {
        venue: VENUE,
        id: dto.id.to_string(),
        order_id: Some(OrderId::new(dto.order_id.to_string())),
        symbol,
        side: if dto.is_buyer { Side::Buy } else { Side::Sell },
        price: decimal("price", &dto.price)?,
        amount: decimal("qty", &dto.qty)?,
        fee: Some(Fee {
            cost: decimal("commission", &dto.commission)?,
            asset: dto.commission_asset.clone(),
        }),
        is_maker: Some(dto.is_maker),
        timestamp: millis("time", dto.time)?,
    })
}

pub fn ws_ticker(dto: &WsTicker, symbol: Symbol) -> Result<Ticker, VenueError> {
    Ok(Ticker {
        venue: VENUE,
        symbol,
        last: decimal("c", &dto.last)?,
        bid: decimal("b", &dto.bid)?,
        ask: decimal("a", &dto.ask)?,
        high: decimal("h", &dto.high)?,
        low: decimal("l", &dto.low)?,
        volume: decimal("v", &dto.volume)?,
        timestamp: millis("E", dto.event_time)?,
    })
}

pub fn ws_trade(dto: &WsTrade, symbol: Symbol) -> Result<Trade, VenueError> {
    Ok(Trade {
        venue: VENUE,
        id: dto.id.to_string(),
        order_id: None,
        symbol,
        side: if dto.buyer_is_maker { Side::Sell } else { Side::Buy },
        price: decimal("p", &dto.price)?,
        amount: decimal("q", &dto.qty)?,
        fee: None,
        is_maker: None,
        timestamp: millis("T", dto.time)?,
    })
}

pub fn ws_candle(dto: &WsKline) -> Result<Candle, VenueError> {
    Ok(Candle {
        open_time: millis("t", dto.open_time)?,
        open: decimal("o", &dto.open)?,
        high: decimal("h", &dto.high)?,
        low: decimal("l", &dto.low)?,
        close: decimal("c", &dto.close)?,
        volume: decimal("v", &dto.volume)?,
    })
}

pub fn execution_report(report: &ExecutionReport, symbols: &SymbolMap) -> Result<Order, VenueError> {
    let filled = decimal("z", &report.cumulative_filled)?;
    let quote = decimal("Z", &report.cumulative_quote)?;
    let commission = decimal("n", &report.commission)?;
    let fee = report
        .commission_asset
        .as_ref()
        .filter(|_| !commission.is_zero())
        .map(|asset| Fee {
            cost: commission,
            asset: asset.clone(),
        });

    Order::new(OrderSnapshot {
        venue: VENUE,
        id: OrderId::new(report.order_id.to_string()),
        client_id: Some(report.client_order_id.clone()),
        symbol: symbols.from_venue(&report.symbol),
        order_type: order_type(&report.order_type)?,
        side: side(&report.side)?,
        amount: decimal("q", &report.quantity)?,
        price: non_zero(decimal("p", &report.price)?),
        average: average(filled, Some(quote)),
        filled,
        status: status(&report.status)?,
        fee,
        created_at: millis("O", report.created_at)?,
        updated_at: millis("E", report.event_time)?,
    })
    .map_err(|e| VenueError::Decode(e.to_string()))
}

pub fn account_position(position: &AccountPosition) -> Result<Vec<Balance>, VenueError> {
    position
        .balances
        .iter()
        .map(|b| {
            Ok(Balance::new(
                VENUE,
                b.asset.to_ascii_uppercase(),
                decimal("f", &b.free)?,
                decimal("l", &b.locked)?,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::adapter::outbound::binance::dto::ExchangeInfoResponse;

    #[test]
    fn error_codes_are_classified() {
        let auth = classify_error(401, r#"{"code":-2015,"msg":"Invalid API-key"}"#);
        assert!(matches!(auth, VenueError::Authentication(m) if m == "Invalid API-key"));

        let business = classify_error(400, r#"{"code":-2010,"msg":"Account has insufficient balance"}"#);
        assert_eq!(
            business,
            VenueError::Rejected {
                code: Some("-2010".into()),
                message: "Account has insufficient balance".into()
            }
        );

        assert!(matches!(
            classify_error(429, r#"{"code":-1003,"msg":"Too many requests"}"#),
            VenueError::RateLimited(_)
        ));
        assert!(matches!(
            classify_error(502, "<html>bad gateway</html>"),
            VenueError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn market_reads_filters() {
        let body = r#"{"symbols":[{
            "symbol":"BTCUSDT","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT",
            "filters":[
                {"filterType":"PRICE_FILTER","minPrice":"0.01","maxPrice":"1000000","tickSize":"0.01000000"},
                {"filterType":"LOT_SIZE","minQty":"0.00001000","maxQty":"9000.00000000","stepSize":"0.00001000"},
                {"filterType":"ICEBERG_PARTS","limit":10},
                {"filterType":"NOTIONAL","minNotional":"5.00000000","applyMinToMarket":true}
            ]}]}"#;
        let info: ExchangeInfoResponse = serde_json::from_str(body).unwrap();
        let market = market(&info.symbols[0], &SymbolMap::passthrough()).unwrap();

        assert_eq!(market.symbol, Symbol::new("BTCUSDT"));
        assert!(market.active);
        assert_eq!(market.price_precision, 2);
        assert_eq!(market.amount_precision, 5);
        assert_eq!(market.min_amount, Some(dec!(0.00001)));
        assert_eq!(market.min_notional, Some(dec!(5)));
    }

    #[test]
    fn partially_filled_order_keeps_remaining_consistent() {
        let body = r#"{
            "symbol":"BTCUSDT","orderId":28,"clientOrderId":"6gCrw2kRUAF9CvJDGP16IP",
            "transactTime":1507725176595,"price":"30000.00","origQty":"10.00000000",
            "executedQty":"4.00000000","cummulativeQuoteQty":"120000.00000000",
            "status":"PARTIALLY_FILLED","timeInForce":"GTC","type":"LIMIT","side":"SELL"
        }"#;
        let dto: OrderResponse = serde_json::from_str(body).unwrap();
        let order = order(&dto, Symbol::new("BTCUSDT")).unwrap();

        assert_eq!(order.status(), OrderStatus::Open);
        assert_eq!(order.filled(), dec!(4));
        assert_eq!(order.filled() + order.remaining(), order.amount);
        assert_eq!(order.average, Some(dec!(30000)));
        assert_eq!(order.side, Side::Sell);
    }

    #[test]
    fn status_vocabulary_maps_onto_lifecycle() {
        assert_eq!(status("NEW").unwrap(), OrderStatus::Open);
        assert_eq!(status("FILLED").unwrap(), OrderStatus::Closed);
        assert_eq!(status("CANCELED").unwrap(), OrderStatus::Canceled);
        assert_eq!(status("REJECTED").unwrap(), OrderStatus::Rejected);
        assert_eq!(status("EXPIRED").unwrap(), OrderStatus::Expired);
        assert!(status("HALTED").is_err());
    }

    #[test]
    fn limit_order_params_include_time_in_force() {
        let request = OrderRequest::limit(Symbol::new("LTCBTC"), Side::Buy, dec!(1), dec!(0.1));
        let params = order_params(&request, "LTCBTC", "abc");
        let keys: Vec<_> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["symbol", "side", "type", "quantity", "timeInForce", "price", "newClientOrderId", "newOrderRespType"]
        );
        assert_eq!(params[3].1, "1");
        assert_eq!(params[5].1, "0.1");
    }

    #[test]
    fn market_order_params_skip_price() {
        let mut request = OrderRequest::market(Symbol::new("BTCUSDT"), Side::Sell, dec!(0.5));
        request.price = Some(dec!(100));
        let params = order_params(&request, "BTCUSDT", "id");
        assert!(params.iter().all(|(k, _)| *k != "price" && *k != "timeInForce"));
    }

    #[test]
    fn stop_limit_params_carry_stop_price() {
        let mut request = OrderRequest::limit(Symbol::new("BTCUSDT"), Side::Sell, dec!(1), dec!(90));
        request.order_type = OrderType::StopLimit;
        request.stop_price = Some(dec!(95));
        let params = order_params(&request, "BTCUSDT", "id");
        assert!(params.contains(&("type", "STOP_LOSS_LIMIT".to_string())));
        assert!(params.contains(&("stopPrice", "95".to_string())));
    }

    #[test]
    fn public_trade_reports_taker_side() {
        let dto = PublicTrade {
            id: 1,
            price: "10".into(),
            qty: "2".into(),
            time: 1_700_000_000_000,
            is_buyer_maker: true,
        };
        let trade = public_trade(&dto, Symbol::new("BTCUSDT")).unwrap();
        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.notional(), dec!(20));
    }

    #[test]
    fn kline_row_parses() {
        let body = r#"[[1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"]]"#;
        let rows: Vec<Kline> = serde_json::from_str(body).unwrap();
        let candle = candle(&rows[0]).unwrap();
        assert_eq!(candle.high, dec!(0.8));
        assert_eq!(candle.open_time.timestamp_millis(), 1_499_040_000_000);
    }

    #[test]
    fn zero_balances_are_dropped() {
        let account: Account = serde_json::from_str(
            r#"{"balances":[{"asset":"BTC","free":"0.5","locked":"0.1"},{"asset":"LTC","free":"0.0","locked":"0.0"}]}"#,
        )
        .unwrap();
        let balances = balances(&account).unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].total, dec!(0.6));
    }
}
