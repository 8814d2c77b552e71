//! Kraken connector.
//!
//! Public endpoints are plain GETs under `/0/public`. Private endpoints are
//! form POSTs under `/0/private` whose body starts with a strictly
//! increasing nonce; the nonce is drawn again on every retry.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::convert;
use super::dto::{
    AddOrderResult, AssetPair, BalanceEntry, CancelResult, ClosedOrders, DepthInfo, OpenOrders,
    OrderInfo, PairRows, TickerInfo, TradesHistory,
};
use super::signer::{Signer, KEY_HEADER, SIGN_HEADER};
use super::stream::MarketProtocol;
use super::symbols::{asset_map, rest_map, ws_map};
use crate::adapter::outbound::shared::{
    encode_params, AssetMap, ConnectorOptions, RestClient, RestRequest, SessionSlot, SymbolMap,
};
use crate::domain::balance::spot_positions;
use crate::domain::market::VenueStatus;
use crate::domain::{
    Balance, Candle, ExchangeInfo, FeeSchedule, Market, Order, OrderBook, OrderId, OrderRequest,
    OrderType, Position, Symbol, Ticker, Timeframe, Trade, VenueId,
};
use crate::error::{Result, VenueError, VenueResultExt};
use crate::infrastructure::config::ExchangeConfig;
use crate::port::stream::StreamPayload;
use crate::port::{Channel, ExchangeConnector, OrderQuery, Subscription, Topic};

const VENUE: VenueId = VenueId::Kraken;

const REST_URL: &str = "https://api.kraken.com";
const SANDBOX_REST_URL: &str = "https://api.sandbox.kraken.com";
const WS_URL: &str = "wss://ws.kraken.com";
const SANDBOX_WS_URL: &str = "wss://ws-sandbox.kraken.com";

const MAX_DEPTH: usize = 500;
const MAX_CANDLES: usize = 720;
const MAX_TRADES: usize = 1000;

pub struct KrakenConnector {
    config: ExchangeConfig,
    rest: RestClient,
    /// `None` without credentials; `Some(Err)` when they are unusable.
    signer: Option<std::result::Result<Signer, VenueError>>,
    symbols: SymbolMap,
    ws_symbols: SymbolMap,
    assets: AssetMap,
    markets: RwLock<BTreeMap<Symbol, Market>>,
    /// Result keys and websocket names seen in `AssetPairs`.
    aliases: RwLock<HashMap<String, Symbol>>,
    connected: AtomicBool,
    ws_url: String,
    market_stream: SessionSlot,
}

impl KrakenConnector {
    #[must_use]
    pub fn new(config: ExchangeConfig, options: &ConnectorOptions) -> Self {
        let default_rest = if config.sandbox { SANDBOX_REST_URL } else { REST_URL };
        let default_ws = if config.sandbox { SANDBOX_WS_URL } else { WS_URL };
        let signer = config.credentials.as_ref().map(|creds| {
            Signer::new(creds).inspect_err(|err| {
                warn!(venue = %VENUE, error = %err, "Unusable credentials, private calls will fail");
            })
        });

        Self {
            rest: RestClient::new(
                VENUE,
                options.rest_settings(&config, default_rest),
                convert::classify_error,
            ),
            signer,
            symbols: rest_map(),
            ws_symbols: ws_map(),
            assets: asset_map(),
            markets: RwLock::new(BTreeMap::new()),
            aliases: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(false),
            ws_url: options.ws_url_or(default_ws),
            market_stream: SessionSlot::new(VENUE, Arc::clone(&options.transport), options.stream.session()),
            config,
        }
    }

    fn pair(&self, symbol: &Symbol) -> String {
        self.markets
            .read()
            .get(symbol)
            .map_or_else(|| self.symbols.to_venue(symbol), |m| m.venue_symbol.clone())
    }

    /// Canonical symbol for any pair name a response may use.
    fn resolve(&self, native: &str) -> Symbol {
        self.aliases
            .read()
            .get(native)
            .cloned()
            .unwrap_or_else(|| self.symbols.from_venue(native))
    }

    fn signer(&self, operation: &'static str) -> std::result::Result<&Signer, VenueError> {
        match &self.signer {
            None => Err(VenueError::MissingCredentials { operation }),
            Some(Err(err)) => Err(err.clone()),
            Some(Ok(signer)) => Ok(signer),
        }
    }

    async fn public<T: DeserializeOwned>(
        &self,
        operation: &str,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<T, VenueError> {
        let path = format!("/0/public/{endpoint}");
        let query = encode_params(params);
        self.rest
            .send_with(
                operation,
                || Ok(RestRequest::get(path.clone()).query(query.clone())),
                convert::unwrap,
            )
            .await
    }

    async fn private<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        endpoint: &str,
        params: &[(&'static str, String)],
    ) -> std::result::Result<T, VenueError> {
        let signer = self.signer(operation)?;
        let path = format!("/0/private/{endpoint}");
        self.rest
            .send_with(
                operation,
                || {
                    let nonce = signer.next_nonce();
                    let mut form = vec![("nonce", nonce.to_string())];
                    form.extend(params.iter().cloned());
                    let body = encode_params(&form);
                    let signature = signer.sign(&path, nonce, &body)?;
                    Ok(RestRequest::post(path.clone())
                        .form(body)
                        .header(KEY_HEADER, signer.api_key())
                        .header(SIGN_HEADER, signature))
                },
                convert::unwrap,
            )
            .await
    }

    async fn load_markets(&self) -> std::result::Result<Vec<Market>, VenueError> {
        let pairs: BTreeMap<String, AssetPair> = self.public("markets", "AssetPairs", &[]).await?;
        let mut markets = Vec::with_capacity(pairs.len());
        let mut aliases = HashMap::with_capacity(pairs.len() * 2);
        for (key, pair) in &pairs {
            let market = convert::market(pair, &self.symbols, &self.assets)?;
            aliases.insert(key.clone(), market.symbol.clone());
            if let Some(ws) = &pair.wsname {
                aliases.insert(ws.clone(), market.symbol.clone());
            }
            markets.push(market);
        }
        *self.markets.write() = markets.iter().map(|m| (m.symbol.clone(), m.clone())).collect();
        *self.aliases.write() = aliases;
        Ok(markets)
    }

    fn orders_from(&self, rows: &BTreeMap<String, OrderInfo>) -> std::result::Result<Vec<Order>, VenueError> {
        rows.iter()
            .map(|(txid, info)| convert::order(txid, info, self.resolve(&info.descr.pair)))
            .collect()
    }

    async fn query_order(
        &self,
        operation: &'static str,
        id: &OrderId,
    ) -> std::result::Result<Order, VenueError> {
        let rows: BTreeMap<String, OrderInfo> = self
            .private(operation, "QueryOrders", &[("txid", id.to_string())])
            .await?;
        let info = rows
            .get(id.as_str())
            .ok_or_else(|| VenueError::rejected(format!("order {id} not found")))?;
        convert::order(id.as_str(), info, self.resolve(&info.descr.pair))
    }

    fn subscribe_market<T: StreamPayload>(&self, topic: Topic) -> Result<Subscription<T>> {
        self.market_stream
            .subscribe(topic, || MarketProtocol::new(self.ws_url.clone(), self.ws_symbols.clone()))
            .for_venue(VENUE)
    }
}

fn since_param(since: Option<DateTime<Utc>>, name: &'static str) -> Vec<(&'static str, String)> {
    since
        .map(|t| vec![(name, t.timestamp().to_string())])
        .unwrap_or_default()
}

fn keep_latest<T>(items: &mut Vec<T>, limit: Option<usize>) {
    if let Some(limit) = limit {
        if items.len() > limit {
            items.drain(..items.len() - limit);
        }
    }
}

#[async_trait]
impl ExchangeConnector for KrakenConnector {
    fn venue(&self) -> VenueId {
        VENUE
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn fees(&self) -> FeeSchedule {
        self.config.fees()
    }

    async fn connect(&self) -> Result<()> {
        let markets = self.load_markets().await.for_venue(VENUE)?;
        if self.signer.is_some() {
            let _: BTreeMap<String, BalanceEntry> =
                self.private("connect", "BalanceEx", &[]).await.for_venue(VENUE)?;
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(
            venue = %VENUE,
            markets = markets.len(),
            authenticated = self.signer.is_some(),
            "Connected"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.market_stream.shutdown().await;
        self.connected.store(false, Ordering::SeqCst);
        info!(venue = %VENUE, "Disconnected");
        Ok(())
    }

    async fn get_exchange_info(&self) -> Result<ExchangeInfo> {
        let markets = self.get_markets().await?;
        Ok(ExchangeInfo {
            venue: VENUE,
            name: "Kraken".into(),
            status: VenueStatus::Online,
            fees: self.fees(),
            rate_limits: self.config.rate_limit,
            timeframes: Timeframe::ALL
                .into_iter()
                .filter(|tf| convert::interval(*tf).is_ok())
                .collect(),
            order_types: OrderType::ALL.to_vec(),
            markets,
        })
    }

    async fn get_markets(&self) -> Result<Vec<Market>> {
        let cached: Vec<Market> = self.markets.read().values().cloned().collect();
        if !cached.is_empty() {
            return Ok(cached);
        }
        self.load_markets().await.for_venue(VENUE)
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker> {
        let result: BTreeMap<String, TickerInfo> = self
            .public("ticker", "Ticker", &[("pair", self.pair(symbol))])
            .await
            .for_venue(VENUE)?;
        convert::only_entry(&result)
            .and_then(|info| convert::ticker(info, symbol.clone()))
            .for_venue(VENUE)
    }

    async fn get_order_book(&self, symbol: &Symbol, depth: usize) -> Result<OrderBook> {
        let count = depth.clamp(1, MAX_DEPTH).to_string();
        let result: BTreeMap<String, DepthInfo> = self
            .public("order_book", "Depth", &[("pair", self.pair(symbol)), ("count", count)])
            .await
            .for_venue(VENUE)?;
        let mut book = convert::only_entry(&result)
            .and_then(|depth| convert::order_book(depth, symbol.clone()))
            .for_venue(VENUE)?;
        book.truncate(depth);
        Ok(book)
    }

    async fn get_trades(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Trade>> {
        let limit = limit.clamp(1, MAX_TRADES);
        let result: PairRows = self
            .public("trades", "Trades", &[("pair", self.pair(symbol)), ("count", limit.to_string())])
            .await
            .for_venue(VENUE)?;
        let rows = convert::pair_rows(&result).for_venue(VENUE)?;
        let mut trades = rows
            .iter()
            .enumerate()
            .map(|(i, row)| convert::public_trade(row, symbol.clone(), i))
            .collect::<std::result::Result<Vec<_>, _>>()
            .for_venue(VENUE)?;
        keep_latest(&mut trades, Some(limit));
        Ok(trades)
    }

    async fn get_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let limit = limit.clamp(1, MAX_CANDLES);
        let interval = convert::interval(timeframe).for_venue(VENUE)?;
        let mut params = vec![("pair", self.pair(symbol)), ("interval", interval.to_string())];
        params.extend(since_param(since, "since"));
        let result: PairRows = self.public("ohlcv", "OHLC", &params).await.for_venue(VENUE)?;
        let rows = convert::pair_rows(&result).for_venue(VENUE)?;
        let mut candles = rows
            .iter()
            .map(|row| convert::candle(row))
            .collect::<std::result::Result<Vec<_>, _>>()
            .for_venue(VENUE)?;
        candles.sort_by_key(|c| c.open_time);
        if since.is_some() {
            candles.truncate(limit);
        } else {
            keep_latest(&mut candles, Some(limit));
        }
        Ok(candles)
    }

    async fn get_balances(&self) -> Result<Vec<Balance>> {
        let entries: BTreeMap<String, BalanceEntry> = self
            .private("get_balances", "BalanceEx", &[])
            .await
            .for_venue(VENUE)?;
        convert::balances(&entries, &self.assets).for_venue(VENUE)
    }

    async fn get_positions(&self, symbols: Option<&[Symbol]>) -> Result<Vec<Position>> {
        let balances = self.get_balances().await?;
        Ok(spot_positions(&balances, symbols))
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order> {
        self.signer("create_order").for_venue(VENUE)?;
        request
            .validate()
            .map_err(|e| VenueError::rejected(e.to_string()))
            .for_venue(VENUE)?;

        let client_id = request.client_id_or_generate();
        let params = convert::order_params(request, &self.pair(&request.symbol), &client_id).for_venue(VENUE)?;
        let result: AddOrderResult = self
            .private("create_order", "AddOrder", &params)
            .await
            .for_venue(VENUE)?;
        let txid = result
            .txid
            .first()
            .ok_or_else(|| VenueError::decode("AddOrder returned no txid"))
            .for_venue(VENUE)?;

        let order = match self.query_order("create_order", &OrderId::new(txid.clone())).await {
            Ok(order) => order,
            Err(err) => {
                warn!(venue = %VENUE, order_id = %txid, error = %err, "Order placed but not yet queryable");
                convert::pending_order(txid, request, &client_id).for_venue(VENUE)?
            }
        };
        info!(
            venue = %VENUE,
            symbol = %order.symbol,
            order_id = %order.id,
            side = %order.side,
            amount = %order.amount,
            status = %order.status(),
            "Order created"
        );
        Ok(order)
    }

    async fn cancel_order(&self, id: &OrderId, _symbol: &Symbol) -> Result<Order> {
        let result: CancelResult = self
            .private("cancel_order", "CancelOrder", &[("txid", id.to_string())])
            .await
            .for_venue(VENUE)?;
        if result.count == 0 {
            return Err(VenueError::rejected(format!("order {id} was not canceled"))).for_venue(VENUE);
        }
        self.query_order("cancel_order", id).await.for_venue(VENUE)
    }

    async fn get_order(&self, id: &OrderId, _symbol: &Symbol) -> Result<Order> {
        self.query_order("get_order", id).await.for_venue(VENUE)
    }

    async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let closed: ClosedOrders = self
            .private("get_orders", "ClosedOrders", &since_param(query.since, "start"))
            .await
            .for_venue(VENUE)?;
        let open: OpenOrders = self
            .private("get_orders", "OpenOrders", &[])
            .await
            .for_venue(VENUE)?;

        let mut orders = self.orders_from(&closed.closed).for_venue(VENUE)?;
        orders.extend(self.orders_from(&open.open).for_venue(VENUE)?);
        orders.retain(|o| {
            query.symbol.as_ref().map_or(true, |s| &o.symbol == s)
                && query.since.map_or(true, |since| o.created_at >= since)
        });
        orders.sort_by_key(|o| o.created_at);
        keep_latest(&mut orders, query.limit);
        Ok(orders)
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>> {
        let open: OpenOrders = self
            .private("get_open_orders", "OpenOrders", &[])
            .await
            .for_venue(VENUE)?;
        let mut orders = self.orders_from(&open.open).for_venue(VENUE)?;
        if let Some(symbol) = symbol {
            orders.retain(|o| &o.symbol == symbol);
        }
        Ok(orders)
    }

    async fn get_my_trades(&self, query: &OrderQuery) -> Result<Vec<Trade>> {
        let history: TradesHistory = self
            .private("get_my_trades", "TradesHistory", &since_param(query.since, "start"))
            .await
            .for_venue(VENUE)?;
        let mut trades = history
            .trades
            .iter()
            .map(|(id, info)| convert::trade(id, info, self.resolve(&info.pair)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .for_venue(VENUE)?;
        if let Some(symbol) = &query.symbol {
            trades.retain(|t| &t.symbol == symbol);
        }
        trades.sort_by_key(|t| t.timestamp);
        keep_latest(&mut trades, query.limit);
        Ok(trades)
    }

    async fn subscribe_to_ticker(&self, symbol: &Symbol) -> Result<Subscription<Ticker>> {
        self.subscribe_market(Topic::symbol(Channel::Ticker, symbol.clone()))
    }

    async fn subscribe_to_order_book(&self, symbol: &Symbol) -> Result<Subscription<OrderBook>> {
        self.subscribe_market(Topic::symbol(Channel::OrderBook, symbol.clone()))
    }

    async fn subscribe_to_trades(&self, symbol: &Symbol) -> Result<Subscription<Trade>> {
        self.subscribe_market(Topic::symbol(Channel::Trades, symbol.clone()))
    }

    async fn subscribe_to_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Subscription<Candle>> {
        convert::interval(timeframe).for_venue(VENUE)?;
        self.subscribe_market(Topic::symbol(Channel::Ohlcv(timeframe), symbol.clone()))
    }

    async fn subscribe_to_orders(&self) -> Result<Subscription<Order>> {
        Err(VenueError::Unsupported("kraken order stream".into())).for_venue(VENUE)
    }

    async fn subscribe_to_balances(&self) -> Result<Subscription<Balance>> {
        Err(VenueError::Unsupported("kraken balance stream".into())).for_venue(VENUE)
    }

    async fn unsubscribe(&self, channel: Channel, symbol: Option<&Symbol>) -> Result<()> {
        self.market_stream.unsubscribe(Topic::new(channel, symbol.cloned()));
        Ok(())
    }
}
