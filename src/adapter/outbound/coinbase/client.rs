//! Coinbase Exchange connector.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use futures_util::future::try_join;
use parking_lot::RwLock;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::convert;
use super::dto::{Account, Book, CandleRow, Fill, OrderResponse, Product, ProductStats, ProductTicker, PublicTrade};
use super::signer::Signer;
use super::stream::FeedProtocol;
use super::symbols::symbol_map;
use crate::adapter::outbound::shared::{encode_params, ConnectorOptions, RestClient, RestRequest, SessionSlot, SymbolMap};
use crate::domain::balance::spot_positions;
use crate::domain::market::VenueStatus;
use crate::domain::{
    Balance, Candle, ExchangeInfo, FeeSchedule, Market, Order, OrderBook, OrderId, OrderRequest,
    OrderStatus, OrderType, Position, Symbol, Ticker, Timeframe, Trade, VenueId,
};
use crate::error::{Result, VenueError, VenueResultExt};
use crate::infrastructure::config::ExchangeConfig;
use crate::port::stream::StreamPayload;
use crate::port::{Channel, ExchangeConnector, OrderQuery, Subscription, Topic};

const VENUE: VenueId = VenueId::Coinbase;

const REST_URL: &str = "https://api.exchange.coinbase.com";
const SANDBOX_REST_URL: &str = "https://api-public.sandbox.exchange.coinbase.com";
const WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";
const SANDBOX_WS_URL: &str = "wss://ws-feed-public.sandbox.exchange.coinbase.com";

/// The venue refuses requests without a user agent.
const USER_AGENT: (&str, &str) = ("User-Agent", concat!("venuebridge/", env!("CARGO_PKG_VERSION")));

const MAX_PAGE: usize = 100;
const MAX_CANDLES: usize = 300;

pub struct CoinbaseConnector {
    config: ExchangeConfig,
    rest: RestClient,
    /// `None` without credentials; `Some(Err)` when they are unusable.
    signer: Option<std::result::Result<Signer, VenueError>>,
    symbols: SymbolMap,
    markets: RwLock<BTreeMap<Symbol, Market>>,
    connected: AtomicBool,
    ws_url: String,
    feed: SessionSlot,
}

impl CoinbaseConnector {
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
            symbols: symbol_map(),
            markets: RwLock::new(BTreeMap::new()),
            connected: AtomicBool::new(false),
            ws_url: options.ws_url_or(default_ws),
            feed: SessionSlot::new(VENUE, Arc::clone(&options.transport), options.stream.session()),
            config,
        }
    }

    fn product_id(&self, symbol: &Symbol) -> String {
        self.markets
            .read()
            .get(symbol)
            .map_or_else(|| self.symbols.to_venue(symbol), |m| m.venue_symbol.clone())
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
        path: &str,
        query: String,
    ) -> std::result::Result<T, VenueError> {
        self.rest
            .send(operation, || {
                Ok(RestRequest::get(path)
                    .query(query.clone())
                    .header(USER_AGENT.0, USER_AGENT.1))
            })
            .await
    }

    /// Signed request. The prehash covers path, query and body exactly as sent.
    async fn private<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        query: String,
        body: Option<String>,
    ) -> std::result::Result<T, VenueError> {
        let signer = self.signer(operation)?;
        self.rest
            .send(operation, || {
                let mut request = RestRequest::new(method.clone(), path)
                    .query(query.clone())
                    .header(USER_AGENT.0, USER_AGENT.1);
                if let Some(body) = &body {
                    request = request.json(body.clone());
                }
                let timestamp = Utc::now().timestamp().to_string();
                let headers = signer.headers(
                    &timestamp,
                    method.as_str(),
                    &request.path_and_query(),
                    body.as_deref().unwrap_or(""),
                )?;
                for (name, value) in headers {
                    request = request.header(name, value);
                }
                Ok(request)
            })
            .await
    }

    async fn load_markets(&self) -> std::result::Result<Vec<Market>, VenueError> {
        let products: Vec<Product> = self.public("products", "/products", String::new()).await?;
        let markets = products
            .iter()
            .map(|p| convert::market(p, &self.symbols))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        *self.markets.write() = markets.iter().map(|m| (m.symbol.clone(), m.clone())).collect();
        Ok(markets)
    }

    async fn fetch_order(&self, id: &OrderId) -> std::result::Result<Order, VenueError> {
        let path = format!("/orders/{id}");
        let dto: OrderResponse = self
            .private("get_order", Method::GET, &path, String::new(), None)
            .await?;
        convert::order(&dto, &self.symbols)
    }

    async fn list_orders(
        &self,
        operation: &'static str,
        params: &[(&str, String)],
    ) -> std::result::Result<Vec<Order>, VenueError> {
        let rows: Vec<OrderResponse> = self
            .private(operation, Method::GET, "/orders", encode_params(params), None)
            .await?;
        rows.iter().map(|o| convert::order(o, &self.symbols)).collect()
    }

    fn candle_window(
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> std::result::Result<Vec<(&'static str, String)>, VenueError> {
        let granularity = convert::granularity(timeframe)?;
        let mut params = vec![("granularity", granularity.to_string())];
        if let Some(start) = since {
            let span = i64::from(granularity) * i64::try_from(limit).unwrap_or_default();
            let end = start + ChronoDuration::seconds(span);
            params.push(("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)));
            params.push(("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        Ok(params)
    }

    fn subscribe_feed<T: StreamPayload>(&self, topic: Topic) -> Result<Subscription<T>> {
        self.feed
            .subscribe(topic, || FeedProtocol::new(self.ws_url.clone(), self.symbols.clone()))
            .for_venue(VENUE)
    }
}

#[async_trait]
impl ExchangeConnector for CoinbaseConnector {
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
            let _: Vec<Account> = self
                .private("connect", Method::GET, "/accounts", String::new(), None)
                .await
                .for_venue(VENUE)?;
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
        self.feed.shutdown().await;
        self.connected.store(false, Ordering::SeqCst);
        info!(venue = %VENUE, "Disconnected");
        Ok(())
    }

    async fn get_exchange_info(&self) -> Result<ExchangeInfo> {
        let markets = self.get_markets().await?;
        Ok(ExchangeInfo {
            venue: VENUE,
            name: "Coinbase".into(),
            status: VenueStatus::Online,
            fees: self.fees(),
            rate_limits: self.config.rate_limit,
            timeframes: Timeframe::ALL
                .into_iter()
                .filter(|tf| convert::granularity(*tf).is_ok())
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
        let product = self.product_id(symbol);
        let ticker_path = format!("/products/{product}/ticker");
        let stats_path = format!("/products/{product}/stats");
        let (ticker, stats): (ProductTicker, ProductStats) = try_join(
            self.public("ticker", &ticker_path, String::new()),
            self.public("ticker_stats", &stats_path, String::new()),
        )
        .await
        .for_venue(VENUE)?;
        convert::ticker(&ticker, &stats, symbol.clone()).for_venue(VENUE)
    }

    async fn get_order_book(&self, symbol: &Symbol, depth: usize) -> Result<OrderBook> {
        let path = format!("/products/{}/book", self.product_id(symbol));
        let dto: Book = self
            .public("order_book", &path, encode_params(&[("level", "2")]))
            .await
            .for_venue(VENUE)?;
        let mut book = convert::order_book(&dto, symbol.clone()).for_venue(VENUE)?;
        book.truncate(depth);
        Ok(book)
    }

    async fn get_trades(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Trade>> {
        let path = format!("/products/{}/trades", self.product_id(symbol));
        let query = encode_params(&[("limit", limit.clamp(1, MAX_PAGE).to_string())]);
        let rows: Vec<PublicTrade> = self.public("trades", &path, query).await.for_venue(VENUE)?;
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
        let limit = limit.clamp(1, MAX_CANDLES);
        let params = Self::candle_window(timeframe, since, limit).for_venue(VENUE)?;
        let path = format!("/products/{}/candles", self.product_id(symbol));
        let rows: Vec<CandleRow> = self
            .public("ohlcv", &path, encode_params(&params))
            .await
            .for_venue(VENUE)?;
        let mut candles = rows
            .iter()
            .map(convert::candle)
            .collect::<std::result::Result<Vec<_>, _>>()
            .for_venue(VENUE)?;
        // Served newest first.
        candles.sort_by_key(|c| c.open_time);
        if since.is_some() {
            candles.truncate(limit);
        } else if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    async fn get_balances(&self) -> Result<Vec<Balance>> {
        let accounts: Vec<Account> = self
            .private("get_balances", Method::GET, "/accounts", String::new(), None)
            .await
            .for_venue(VENUE)?;
        convert::balances(&accounts).for_venue(VENUE)
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
        let body = convert::order_body(request, &self.product_id(&request.symbol), &client_id);
        let dto: OrderResponse = self
            .private("create_order", Method::POST, "/orders", String::new(), Some(body.to_string()))
            .await
            .for_venue(VENUE)?;
        let order = convert::order(&dto, &self.symbols).for_venue(VENUE)?;
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
        let before = self.fetch_order(id).await.for_venue(VENUE)?;
        let path = format!("/orders/{id}");
        let _: serde_json::Value = self
            .private("cancel_order", Method::DELETE, &path, String::new(), None)
            .await
            .for_venue(VENUE)?;

        // Canceled orders without fills are purged and no longer queryable.
        match self.fetch_order(id).await {
            Ok(order) => Ok(order),
            Err(VenueError::Rejected { .. }) => {
                let mut order = before;
                let filled = order.filled();
                order
                    .apply_update(OrderStatus::Canceled, filled, None)
                    .map_err(|e| VenueError::decode(e.to_string()))
                    .for_venue(VENUE)?;
                Ok(order)
            }
            Err(err) => Err(err).for_venue(VENUE),
        }
    }

    async fn get_order(&self, id: &OrderId, _symbol: &Symbol) -> Result<Order> {
        self.fetch_order(id).await.for_venue(VENUE)
    }

    async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut params = vec![("status", "all".to_string())];
        if let Some(symbol) = &query.symbol {
            params.push(("product_id", self.product_id(symbol)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.clamp(1, MAX_PAGE).to_string()));
        }
        let mut orders = self.list_orders("get_orders", &params).await.for_venue(VENUE)?;
        if let Some(since) = query.since {
            orders.retain(|o| o.created_at >= since);
        }
        Ok(orders)
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>> {
        let mut params = vec![
            ("status", "open".to_string()),
            ("status", "pending".to_string()),
            ("status", "active".to_string()),
        ];
        if let Some(symbol) = symbol {
            params.push(("product_id", self.product_id(symbol)));
        }
        self.list_orders("get_open_orders", &params).await.for_venue(VENUE)
    }

    async fn get_my_trades(&self, query: &OrderQuery) -> Result<Vec<Trade>> {
        self.signer("get_my_trades").for_venue(VENUE)?;
        let symbol = query
            .symbol
            .as_ref()
            .ok_or_else(|| VenueError::Unsupported("get_my_trades requires a symbol on coinbase".into()))
            .for_venue(VENUE)?;
        let mut params = vec![("product_id", self.product_id(symbol))];
        if let Some(limit) = query.limit {
            params.push(("limit", limit.clamp(1, MAX_PAGE).to_string()));
        }
        let rows: Vec<Fill> = self
            .private("get_my_trades", Method::GET, "/fills", encode_params(&params), None)
            .await
            .for_venue(VENUE)?;
        let mut trades = rows
            .iter()
            .map(|f| convert::fill(f, &self.symbols))
            .collect::<std::result::Result<Vec<_>, _>>()
            .for_venue(VENUE)?;
        if let Some(since) = query.since {
            trades.retain(|t| t.timestamp >= since);
        }
        Ok(trades)
    }

    async fn subscribe_to_ticker(&self, symbol: &Symbol) -> Result<Subscription<Ticker>> {
        self.subscribe_feed(Topic::symbol(Channel::Ticker, symbol.clone()))
    }

    async fn subscribe_to_order_book(&self, symbol: &Symbol) -> Result<Subscription<OrderBook>> {
        self.subscribe_feed(Topic::symbol(Channel::OrderBook, symbol.clone()))
    }

    async fn subscribe_to_trades(&self, symbol: &Symbol) -> Result<Subscription<Trade>> {
        self.subscribe_feed(Topic::symbol(Channel::Trades, symbol.clone()))
    }

    async fn subscribe_to_ohlcv(
        &self,
        _symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Subscription<Candle>> {
        Err(VenueError::Unsupported(format!(
            "coinbase does not stream {} candles",
            timeframe.as_str()
        )))
        .for_venue(VENUE)
    }

    async fn subscribe_to_orders(&self) -> Result<Subscription<Order>> {
        Err(VenueError::Unsupported("coinbase order stream".into())).for_venue(VENUE)
    }

    async fn subscribe_to_balances(&self) -> Result<Subscription<Balance>> {
        Err(VenueError::Unsupported("coinbase balance stream".into())).for_venue(VENUE)
    }

    async fn unsubscribe(&self, channel: Channel, symbol: Option<&Symbol>) -> Result<()> {
        self.feed.unsubscribe(Topic::new(channel, symbol.cloned()));
        Ok(())
    }
}
