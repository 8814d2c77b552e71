//! Exchange connector port.
//!
//! [`ExchangeConnector`] is the uniform operation set every venue adapter
//! implements. The management service only ever talks to venues through it,
//! so tests can substitute scripted connectors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::stream::{Channel, Subscription};
use crate::domain::{
    Balance, Candle, ExchangeInfo, FeeSchedule, Market, Order, OrderBook, OrderId, OrderRequest,
    Position, Symbol, Ticker, Timeframe, Trade, VenueId,
};
use crate::error::Result;

/// Filter for order and fill history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub symbol: Option<Symbol>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl OrderQuery {
    #[must_use]
    pub fn for_symbol(symbol: Symbol) -> Self {
        Self {
            symbol: Some(symbol),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Uniform trading interface over one venue.
///
/// All methods take `&self`; adapters hold their mutable state (caches,
/// streaming sessions) behind interior locks so one instance can be shared
/// across tasks. Errors always carry the venue they originated from.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    fn venue(&self) -> VenueId;

    fn is_connected(&self) -> bool;

    /// Fee rates used for routing and arbitrage netting.
    fn fees(&self) -> FeeSchedule;

    /// Verify reachability, load markets and, when credentials are present,
    /// validate them and start the private stream if the venue needs one.
    async fn connect(&self) -> Result<()>;

    /// Close every socket and stop all reconnect and keep-alive tasks.
    async fn disconnect(&self) -> Result<()>;

    async fn get_exchange_info(&self) -> Result<ExchangeInfo>;

    async fn get_markets(&self) -> Result<Vec<Market>>;

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker>;

    async fn get_order_book(&self, symbol: &Symbol, depth: usize) -> Result<OrderBook>;

    async fn get_trades(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Trade>>;

    async fn get_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    async fn get_balances(&self) -> Result<Vec<Balance>>;

    async fn get_positions(&self, symbols: Option<&[Symbol]>) -> Result<Vec<Position>>;

    async fn create_order(&self, request: &OrderRequest) -> Result<Order>;

    async fn cancel_order(&self, id: &OrderId, symbol: &Symbol) -> Result<Order>;

    async fn get_order(&self, id: &OrderId, symbol: &Symbol) -> Result<Order>;

    async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>>;

    async fn get_my_trades(&self, query: &OrderQuery) -> Result<Vec<Trade>>;

    async fn subscribe_to_ticker(&self, symbol: &Symbol) -> Result<Subscription<Ticker>>;

    async fn subscribe_to_order_book(&self, symbol: &Symbol) -> Result<Subscription<OrderBook>>;

    async fn subscribe_to_trades(&self, symbol: &Symbol) -> Result<Subscription<Trade>>;

    async fn subscribe_to_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Subscription<Candle>>;

    async fn subscribe_to_orders(&self) -> Result<Subscription<Order>>;

    async fn subscribe_to_balances(&self) -> Result<Subscription<Balance>>;

    /// Drop every subscriber of a channel, optionally for one symbol only.
    async fn unsubscribe(&self, channel: Channel, symbol: Option<&Symbol>) -> Result<()>;
}
