//! Binance spot connector.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::convert;
use super::dto::{
    Account, AccountTrade, Depth, ExchangeInfoResponse, Kline, OrderResponse, PublicTrade, ServerTime,
    Ticker24h,
};
use super::signer::{Signer, DEFAULT_RECV_WINDOW};
use super::stream::MarketProtocol;
use super::symbols::symbol_map;
use super::user_stream::UserStream;
use crate::adapter::outbound::shared::{
    encode_params, ConnectorOptions, RestClient, RestRequest, SessionSlot, SymbolMap,
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

const VENUE: VenueId = VenueId::Binance;

const REST_URL: &str = "https://api.binance.com";
const SANDBOX_REST_URL: &str = "https://testnet.binance.vision";
const WS_URL: &str = "wss://stream.binance.com:9443";
const SANDBOX_WS_URL: &str = "wss://testnet.binance.vision";

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Book depths the REST endpoint accepts.
const DEPTH_LIMITS: [usize; 8] = [5, 10, 20, 50, 100, 500, 1000, 5000];
const MAX_ROWS: usize = 1000;

pub struct BinanceConnector {
    config: ExchangeConfig,
    rest: Arc<RestClient>,
    signer: Option<Signer>,
    symbols: SymbolMap,
    markets: RwLock<BTreeMap<Symbol, Market>>,
    connected: AtomicBool,
    /// Venue clock minus local clock, applied to signed timestamps.
    clock_offset_ms: AtomicI64,
    ws_url: String,
    market_stream: SessionSlot,
    user_stream: Option<UserStream>,
}

impl BinanceConnector {
    #[must_use]
    pub fn new(config: ExchangeConfig, options: &ConnectorOptions) -> Self {
        let default_rest = if config.sandbox { SANDBOX_REST_URL } else { REST_URL };
        let default_ws = if config.sandbox { SANDBOX_WS_URL } else { WS_URL };
        let rest = Arc::new(RestClient::new(
            VENUE,
            options.rest_settings(&config, default_rest),
            convert::classify_error,
        ));
        let ws_url = options.ws_url_or(default_ws);
        let session = options.stream.session();
        let symbols = symbol_map();

        let signer = config
            .credentials
            .clone()
            .map(|creds| Signer::new(creds, DEFAULT_RECV_WINDOW));
        let user_stream = signer.as_ref().map(|signer| {
            UserStream::new(
                Arc::clone(&rest),
                signer.api_key().to_string(),
                ws_url.clone(),
                symbols.clone(),
                options.stream.keepalive_interval(),
                SessionSlot::new(VENUE, Arc::clone(&options.transport), session),
            )
        });

        Self {
            market_stream: SessionSlot::new(VENUE, Arc::clone(&options.transport), session),
            config,
            rest,
            signer,
            symbols,
            markets: RwLock::new(BTreeMap::new()),
            connected: AtomicBool::new(false),
            clock_offset_ms: AtomicI64::new(0),
            ws_url,
            user_stream,
        }
    }

    fn venue_symbol(&self, symbol: &Symbol) -> String {
        self.markets
            .read()
            .get(symbol)
            .map_or_else(|| self.symbols.to_venue(symbol), |m| m.venue_symbol.clone())
    }

    fn signer(&self, operation: &'static str) -> std::result::Result<&Signer, VenueError> {
        self.signer
            .as_ref()
            .ok_or(VenueError::MissingCredentials { operation })
    }

    async fn public<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: String,
    ) -> std::result::Result<T, VenueError> {
        self.rest
            .send(operation, || Ok(RestRequest::get(path).query(query.clone())))
            .await
    }

    /// Signed request; params are sent in the query string, as signed.
    async fn signed<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<T, VenueError> {
        let signer = self.signer(operation)?;
        let query = encode_params(params);
        let offset = self.clock_offset_ms.load(Ordering::Relaxed);
        self.rest
            .send(operation, || {
                let timestamp = Utc::now().timestamp_millis() + offset;
                Ok(RestRequest::new(method.clone(), path)
                    .query(signer.signed_query(&query, timestamp)?)
                    .header(API_KEY_HEADER, signer.api_key()))
            })
            .await
    }

    async fn sync_clock(&self) -> std::result::Result<(), VenueError> {
        let before = Utc::now().timestamp_millis();
        let time: ServerTime = self.public("server_time", "/api/v3/time", String::new()).await?;
        let after = Utc::now().timestamp_millis();
        let offset = time.server_time - (before + after) / 2;
        self.clock_offset_ms.store(offset, Ordering::Relaxed);
        debug!(venue = %VENUE, offset_ms = offset, "Clock offset measured");
        Ok(())
    }

    async fn load_markets(&self) -> std::result::Result<Vec<Market>, VenueError> {
        let info: ExchangeInfoResponse = self
            .public("exchange_info", "/api/v3/exchangeInfo", String::new())
            .await?;
        let markets = info
            .symbols
            .iter()
            .map(|s| convert::market(s, &self.symbols))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        *self.markets.write() = markets.iter().map(|m| (m.symbol.clone(), m.clone())).collect();
        Ok(markets)
    }

    fn cached_markets(&self) -> Vec<Market> {
        self.markets.read().values().cloned().collect()
    }

    /// Local checks against venue filters, before any network call.
    fn check_request(&self, request: &OrderRequest) -> std::result::Result<(), VenueError> {
        request
            .validate()
            .map_err(|e| VenueError::rejected(e.to_string()))?;
        let markets = self.markets.read();
        let Some(market) = markets.get(&request.symbol) else {
            return Ok(());
        };
        if let Some(min) = market.min_amount {
            if request.amount < min {
                return Err(VenueError::rejected(format!(
                    "amount {} is below the minimum {min} for {}",
                    request.amount, request.symbol
                )));
            }
        }
        if let (Some(min), Some(price)) = (market.min_notional, request.price) {
            if request.amount * price < min {
                return Err(VenueError::rejected(format!(
                    "notional {} is below the minimum {min} for {}",
                    request.amount * price,
                    request.symbol
                )));
            }
        }
        Ok(())
    }

    fn subscribe_market<T: StreamPayload>(&self, topic: Topic) -> Result<Subscription<T>> {
        self.market_stream
            .subscribe(topic, || MarketProtocol::new(self.ws_url.clone(), self.symbols.clone()))
            .for_venue(VENUE)
    }

    fn subscribe_user<T: StreamPayload>(&self, channel: Channel) -> Result<Subscription<T>> {
        let operation = match channel {
            Channel::Orders => "subscribe_to_orders",
            _ => "subscribe_to_balances",
        };
        self.signer(operation).for_venue(VENUE)?;
        self.user_stream
            .as_ref()
            .ok_or(VenueError::NotConnected)
            .and_then(|user| user.subscribe(channel))
            .for_venue(VENUE)
    }

    fn history_params(
        &self,
        query: &OrderQuery,
        operation: &'static str,
    ) -> std::result::Result<Vec<(&'static str, String)>, VenueError> {
        let symbol = query.symbol.as_ref().ok_or_else(|| {
            VenueError::Unsupported(format!("{operation} requires a symbol on binance"))
        })?;
        let mut params = vec![("symbol", self.venue_symbol(symbol))];
        if let Some(since) = query.since {
            params.push(("startTime", since.timestamp_millis().to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.clamp(1, MAX_ROWS).to_string()));
        }
        Ok(params)
    }
}

fn depth_limit(depth: usize) -> usize {
    DEPTH_LIMITS
        .into_iter()
        .find(|limit| *limit >= depth)
        .unwrap_or(DEPTH_LIMITS[DEPTH_LIMITS.len() - 1])
}

#[async_trait]
impl ExchangeConnector for BinanceConnector {
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
        self.sync_clock().await.for_venue(VENUE)?;
        let markets = self.load_markets().await.for_venue(VENUE)?;

        if self.signer.is_some() {
            // Validates the credentials; an auth failure aborts the connect.
            let _: Account = self
                .signed("connect", Method::GET, "/api/v3/account", &[])
                .await
                .for_venue(VENUE)?;
            if let Some(user) = &self.user_stream {
                user.start().await.for_venue(VENUE)?;
            }
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
        if let Some(user) = &self.user_stream {
            user.stop().await;
        }
        self.connected.store(false, Ordering::SeqCst);
        info!(venue = %VENUE, "Disconnected");
        Ok(())
    }

    async fn get_exchange_info(&self) -> Result<ExchangeInfo> {
        let markets = self.get_markets().await?;
        Ok(ExchangeInfo {
            venue: VENUE,
            name: "Binance".into(),
            status: VenueStatus::Online,
            fees: self.fees(),
            rate_limits: self.config.rate_limit,
            timeframes: Timeframe::ALL.to_vec(),
            order_types: OrderType::ALL.to_vec(),
            markets,
        })
    }

    async fn get_markets(&self) -> Result<Vec<Market>> {
        let cached = self.cached_markets();
        if !cached.is_empty() {
            return Ok(cached);
        }
        self.load_markets().await.for_venue(VENUE)
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker> {
        let query = encode_params(&[("symbol", self.venue_symbol(symbol))]);
        let dto: Ticker24h = self
            .public("ticker", "/api/v3/ticker/24hr", query)
            .await
            .for_venue(VENUE)?;
        convert::ticker(&dto, symbol.clone()).for_venue(VENUE)
    }

    async fn get_order_book(&self, symbol: &Symbol, depth: usize) -> Result<OrderBook> {
        let query = encode_params(&[
            ("symbol", self.venue_symbol(symbol)),
            ("limit", depth_limit(depth).to_string()),
        ]);
        let dto: Depth = self
            .public("order_book", "/api/v3/depth", query)
            .await
            .for_venue(VENUE)?;
        let mut book = convert::order_book(&dto, symbol.clone()).for_venue(VENUE)?;
        book.truncate(depth);
        Ok(book)
    }

    async fn get_trades(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Trade>> {
        let query = encode_params(&[
            ("symbol", self.venue_symbol(symbol)),
            ("limit", limit.clamp(1, MAX_ROWS).to_string()),
        ]);
        let rows: Vec<PublicTrade> = self
            .public("trades", "/api/v3/trades", query)
            .await
            .for_venue(VENUE)?;
        rows.iter()
            .map(|t| convert::public_trade(t, symbol.clone()))
            .collect::<std::result::Result<_, _>>()
            .for_venue(VENUE)
    }

    async fn get_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let mut params = vec![
            ("symbol", self.venue_symbol(symbol)),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.clamp(1, MAX_ROWS).to_string()),
        ];
        if let Some(since) = since {
            params.push(("startTime", since.timestamp_millis().to_string()));
        }
        let rows: Vec<Kline> = self
            .public("ohlcv", "/api/v3/klines", encode_params(&params))
            .await
            .for_venue(VENUE)?;
        rows.iter()
            .map(convert::candle)
            .collect::<std::result::Result<_, _>>()
            .for_venue(VENUE)
    }

    async fn get_balances(&self) -> Result<Vec<Balance>> {
        let account: Account = self
            .signed("get_balances", Method::GET, "/api/v3/account", &[])
            .await
            .for_venue(VENUE)?;
        convert::balances(&account).for_venue(VENUE)
    }

    async fn get_positions(&self, symbols: Option<&[Symbol]>) -> Result<Vec<Position>> {
        let balances = self.get_balances().await?;
        Ok(spot_positions(&balances, symbols))
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order> {
        self.signer("create_order").for_venue(VENUE)?;
        self.check_request(request).for_venue(VENUE)?;

        let client_id = request.client_id_or_generate();
        let params = convert::order_params(request, &self.venue_symbol(&request.symbol), &client_id);
        let dto: OrderResponse = self
            .signed("create_order", Method::POST, "/api/v3/order", &params)
            .await
            .for_venue(VENUE)?;
        let order = convert::order(&dto, request.symbol.clone()).for_venue(VENUE)?;
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

    async fn cancel_order(&self, id: &OrderId, symbol: &Symbol) -> Result<Order> {
        let params = [
            ("symbol", self.venue_symbol(symbol)),
            ("orderId", id.to_string()),
        ];
        let dto: OrderResponse = self
            .signed("cancel_order", Method::DELETE, "/api/v3/order", &params)
            .await
            .for_venue(VENUE)?;
        convert::order(&dto, symbol.clone()).for_venue(VENUE)
    }

    async fn get_order(&self, id: &OrderId, symbol: &Symbol) -> Result<Order> {
        let params = [
            ("symbol", self.venue_symbol(symbol)),
            ("orderId", id.to_string()),
        ];
        let dto: OrderResponse = self
            .signed("get_order", Method::GET, "/api/v3/order", &params)
            .await
            .for_venue(VENUE)?;
        convert::order(&dto, symbol.clone()).for_venue(VENUE)
    }

    async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        self.signer("get_orders").for_venue(VENUE)?;
        let params = self.history_params(query, "get_orders").for_venue(VENUE)?;
        let rows: Vec<OrderResponse> = self
            .signed("get_orders", Method::GET, "/api/v3/allOrders", &params)
            .await
            .for_venue(VENUE)?;
        rows.iter()
            .map(|o| convert::order(o, self.symbols.from_venue(&o.symbol)))
            .collect::<std::result::Result<_, _>>()
            .for_venue(VENUE)
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>> {
        let params: Vec<_> = symbol
            .map(|s| ("symbol", self.venue_symbol(s)))
            .into_iter()
            .collect();
        let rows: Vec<OrderResponse> = self
            .signed("get_open_orders", Method::GET, "/api/v3/openOrders", &params)
            .await
            .for_venue(VENUE)?;
        rows.iter()
            .map(|o| convert::order(o, self.symbols.from_venue(&o.symbol)))
            .collect::<std::result::Result<_, _>>()
            .for_venue(VENUE)
    }

    async fn get_my_trades(&self, query: &OrderQuery) -> Result<Vec<Trade>> {
        self.signer("get_my_trades").for_venue(VENUE)?;
        let params = self.history_params(query, "get_my_trades").for_venue(VENUE)?;
        let rows: Vec<AccountTrade> = self
            .signed("get_my_trades", Method::GET, "/api/v3/myTrades", &params)
            .await
            .for_venue(VENUE)?;
        rows.iter()
            .map(|t| convert::account_trade(t, self.symbols.from_venue(&t.symbol)))
            .collect::<std::result::Result<_, _>>()
            .for_venue(VENUE)
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
        self.subscribe_market(Topic::symbol(Channel::Ohlcv(timeframe), symbol.clone()))
    }

    async fn subscribe_to_orders(&self) -> Result<Subscription<Order>> {
        self.subscribe_user(Channel::Orders)
    }

    async fn subscribe_to_balances(&self) -> Result<Subscription<Balance>> {
        self.subscribe_user(Channel::Balances)
    }

    async fn unsubscribe(&self, channel: Channel, symbol: Option<&Symbol>) -> Result<()> {
        if channel.is_private() {
            match &self.user_stream {
                Some(user) => user.unsubscribe(channel),
                None => warn!(venue = %VENUE, channel = %channel, "No user stream to unsubscribe from"),
            }
        } else {
            self.market_stream
                .unsubscribe(Topic::new(channel, symbol.cloned()));
        }
        Ok(())
    }
}
