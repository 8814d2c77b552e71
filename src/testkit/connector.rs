//! Scripted in-process [`ExchangeConnector`].
//!
//! [`MockConnector`] serves market data from what the test seeds, fills
//! orders immediately (or leaves them resting), and lets tests inject a
//! failure per operation name. Streaming subscriptions are fed by
//! [`MockConnector::push_ticker`] and [`MockConnector::push_book`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::domain::balance::spot_positions;
use crate::domain::market::VenueStatus;
use crate::domain::order::OrderSnapshot;
use crate::domain::{
    Balance, Candle, ExchangeInfo, Fee, FeeSchedule, Market, Order, OrderBook, OrderId,
    OrderRequest, OrderStatus, OrderType, Position, RateQuota, Side, Symbol, Ticker, Timeframe,
    Trade, VenueId,
};
use crate::error::{Error, Result, VenueError};
use crate::port::stream::{offer_event, offer_failure, Delivery};
use crate::port::{Channel, ExchangeConnector, OrderQuery, StreamUpdate, Subscription, Topic};

const CAPACITY: usize = 64;

type Sinks<T> = Vec<(Symbol, mpsc::Sender<StreamUpdate<T>>)>;

#[derive(Default)]
struct State {
    tickers: HashMap<Symbol, Ticker>,
    books: HashMap<Symbol, OrderBook>,
    balances: Vec<Balance>,
    orders: Vec<Order>,
    fills: Vec<Trade>,
    fill_price: Option<Decimal>,
    resting: bool,
    failures: HashMap<&'static str, VenueError>,
    calls: HashMap<&'static str, usize>,
    next_id: u64,
    ticker_sinks: Sinks<Ticker>,
    book_sinks: Sinks<OrderBook>,
    idle_sinks: Vec<mpsc::Sender<StreamUpdate<Trade>>>,
}

pub struct MockConnector {
    venue: VenueId,
    fees: FeeSchedule,
    connected: AtomicBool,
    state: Mutex<State>,
}

impl MockConnector {
    pub fn new(venue: VenueId) -> Self {
        Self {
            venue,
            fees: FeeSchedule::ZERO,
            connected: AtomicBool::new(false),
            state: Mutex::new(State::default()),
        }
    }

    /// Start in the connected state, as if `connect()` had succeeded.
    #[must_use]
    pub fn connected(self) -> Self {
        self.connected.store(true, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub const fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    #[must_use]
    pub fn with_ticker(self, ticker: Ticker) -> Self {
        self.state.lock().tickers.insert(ticker.symbol.clone(), ticker);
        self
    }

    #[must_use]
    pub fn with_book(self, book: OrderBook) -> Self {
        self.state.lock().books.insert(book.symbol.clone(), book);
        self
    }

    #[must_use]
    pub fn with_balance(self, balance: Balance) -> Self {
        self.state.lock().balances.push(balance);
        self
    }

    /// Fill every order at `price` instead of the quoted touch.
    #[must_use]
    pub fn with_fill_price(self, price: Decimal) -> Self {
        self.state.lock().fill_price = Some(price);
        self
    }

    /// Leave new orders open and unfilled.
    #[must_use]
    pub fn resting(self) -> Self {
        self.state.lock().resting = true;
        self
    }

    /// Make every call to `operation` fail with `err`.
    #[must_use]
    pub fn failing(self, operation: &'static str, err: VenueError) -> Self {
        self.state.lock().failures.insert(operation, err);
        self
    }

    /// Calls made to `operation`, failed ones included.
    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Every order this connector accepted, oldest first.
    pub fn created_orders(&self) -> Vec<Order> {
        self.state.lock().orders.clone()
    }

    /// Replace the seeded ticker and deliver it to live subscribers.
    pub fn push_ticker(&self, ticker: Ticker) {
        let mut state = self.state.lock();
        state.tickers.insert(ticker.symbol.clone(), ticker.clone());
        state.ticker_sinks.retain(|(symbol, tx)| {
            if *symbol != ticker.symbol {
                return !tx.is_closed();
            }
            offer_event(tx, ticker.clone()) != Delivery::Closed
        });
    }

    pub fn push_book(&self, book: OrderBook) {
        let mut state = self.state.lock();
        state.books.insert(book.symbol.clone(), book.clone());
        state.book_sinks.retain(|(symbol, tx)| {
            if *symbol != book.symbol {
                return !tx.is_closed();
            }
            offer_event(tx, book.clone()) != Delivery::Closed
        });
    }

    /// Deliver a terminal failure to every market-data subscriber and drop them.
    pub fn fail_streams(&self, err: VenueError) {
        let mut state = self.state.lock();
        for (_, tx) in state.ticker_sinks.drain(..) {
            offer_failure(&tx, err.clone());
        }
        for (_, tx) in state.book_sinks.drain(..) {
            offer_failure(&tx, err.clone());
        }
    }

    /// Live ticker subscribers.
    pub fn ticker_subscribers(&self) -> usize {
        let mut state = self.state.lock();
        state.ticker_sinks.retain(|(_, tx)| !tx.is_closed());
        state.ticker_sinks.len()
    }

    fn enter(&self, operation: &'static str) -> Result<()> {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_default() += 1;
        match state.failures.get(operation) {
            Some(err) => Err(Error::exchange(self.venue, err.clone())),
            None => Ok(()),
        }
    }

    fn fail(&self, err: VenueError) -> Error {
        Error::exchange(self.venue, err)
    }

    fn market(&self, symbol: &Symbol) -> Market {
        let (base, quote) = symbol.split().unwrap_or((symbol.as_str(), ""));
        Market {
            symbol: symbol.clone(),
            venue_symbol: symbol.to_string(),
            base: base.to_string(),
            quote: quote.to_string(),
            active: true,
            price_precision: 8,
            amount_precision: 8,
            min_amount: None,
            max_amount: None,
            min_notional: None,
        }
    }
}

fn quote_asset(symbol: &Symbol) -> String {
    symbol.split().map_or_else(|| "USDT".to_string(), |(_, q)| q.to_string())
}

#[async_trait]
impl ExchangeConnector for MockConnector {
    fn venue(&self) -> VenueId {
        self.venue
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn fees(&self) -> FeeSchedule {
        self.fees
    }

    async fn connect(&self) -> Result<()> {
        self.enter("connect")?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.enter("disconnect")?;
        self.connected.store(false, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.ticker_sinks.clear();
        state.book_sinks.clear();
        state.idle_sinks.clear();
        Ok(())
    }

    async fn get_exchange_info(&self) -> Result<ExchangeInfo> {
        let markets = self.get_markets().await?;
        Ok(ExchangeInfo {
            venue: self.venue,
            name: self.venue.to_string(),
            status: VenueStatus::Online,
            fees: self.fees,
            rate_limits: RateQuota::default(),
            timeframes: Timeframe::ALL.to_vec(),
            order_types: vec![OrderType::Market, OrderType::Limit],
            markets,
        })
    }

    async fn get_markets(&self) -> Result<Vec<Market>> {
        self.enter("get_markets")?;
        let mut symbols: Vec<Symbol> = self.state.lock().tickers.keys().cloned().collect();
        symbols.sort();
        Ok(symbols.iter().map(|s| self.market(s)).collect())
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker> {
        self.enter("get_ticker")?;
        self.state
            .lock()
            .tickers
            .get(symbol)
            .cloned()
            .ok_or_else(|| self.fail(VenueError::rejected(format!("unknown symbol {symbol}"))))
    }

    async fn get_order_book(&self, symbol: &Symbol, depth: usize) -> Result<OrderBook> {
        self.enter("get_order_book")?;
        let mut book = self
            .state
            .lock()
            .books
            .get(symbol)
            .cloned()
            .ok_or_else(|| self.fail(VenueError::rejected(format!("unknown symbol {symbol}"))))?;
        book.truncate(depth);
        Ok(book)
    }

    async fn get_trades(&self, _symbol: &Symbol, _limit: usize) -> Result<Vec<Trade>> {
        self.enter("get_trades")?;
        Ok(Vec::new())
    }

    async fn get_ohlcv(
        &self,
        _symbol: &Symbol,
        _timeframe: Timeframe,
        _since: Option<DateTime<Utc>>,
        _limit: usize,
    ) -> Result<Vec<Candle>> {
        self.enter("get_ohlcv")?;
        Ok(Vec::new())
    }

    async fn get_balances(&self) -> Result<Vec<Balance>> {
        self.enter("get_balances")?;
        Ok(self.state.lock().balances.clone())
    }

    async fn get_positions(&self, symbols: Option<&[Symbol]>) -> Result<Vec<Position>> {
        let balances = self.get_balances().await?;
        Ok(spot_positions(&balances, symbols))
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order> {
        self.enter("create_order")?;
        request.validate()?;
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = OrderId::new(format!("{}-{}", self.venue, state.next_id));
        let touch = state.tickers.get(&request.symbol).map(|t| match request.side {
            Side::Buy => t.ask,
            Side::Sell => t.bid,
        });
        let price = state
            .fill_price
            .or(touch)
            .or(request.price)
            .unwrap_or(Decimal::ZERO);
        let now = Utc::now();
        let (status, filled) = if state.resting {
            (OrderStatus::Open, Decimal::ZERO)
        } else {
            (OrderStatus::Closed, request.amount)
        };
        let fee = Fee {
            cost: self.fees.taker * filled * price,
            asset: quote_asset(&request.symbol),
        };
        let order = Order::new(OrderSnapshot {
            venue: self.venue,
            id: id.clone(),
            client_id: request.client_id.clone(),
            symbol: request.symbol.clone(),
            order_type: request.order_type,
            side: request.side,
            amount: request.amount,
            price: request.price,
            average: (filled > Decimal::ZERO).then_some(price),
            filled,
            status,
            fee: Some(fee.clone()),
            created_at: now,
            updated_at: now,
        })?;
        if filled > Decimal::ZERO {
            let fill_id = format!("{id}-fill");
            state.fills.push(Trade {
                venue: self.venue,
                id: fill_id,
                order_id: Some(id),
                symbol: request.symbol.clone(),
                side: request.side,
                price,
                amount: filled,
                fee: Some(fee),
                is_maker: Some(false),
                timestamp: now,
            });
        }
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, id: &OrderId, _symbol: &Symbol) -> Result<Order> {
        self.enter("cancel_order")?;
        let mut state = self.state.lock();
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == *id)
            .ok_or_else(|| self.fail(VenueError::rejected(format!("unknown order {id}"))))?;
        if order.is_terminal() {
            return Err(self.fail(VenueError::rejected(format!("order {id} is {}", order.status()))));
        }
        let filled = order.filled();
        order.apply_update(OrderStatus::Canceled, filled, None)?;
        Ok(order.clone())
    }

    async fn get_order(&self, id: &OrderId, _symbol: &Symbol) -> Result<Order> {
        self.enter("get_order")?;
        self.state
            .lock()
            .orders
            .iter()
            .find(|o| o.id == *id)
            .cloned()
            .ok_or_else(|| self.fail(VenueError::rejected(format!("unknown order {id}"))))
    }

    async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        self.enter("get_orders")?;
        let mut orders: Vec<Order> = self
            .state
            .lock()
            .orders
            .iter()
            .filter(|o| query.symbol.as_ref().map_or(true, |s| o.symbol == *s))
            .filter(|o| query.since.map_or(true, |since| o.created_at >= since))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            let skip = orders.len().saturating_sub(limit);
            orders.drain(..skip);
        }
        Ok(orders)
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>> {
        self.enter("get_open_orders")?;
        Ok(self
            .state
            .lock()
            .orders
            .iter()
            .filter(|o| !o.is_terminal())
            .filter(|o| symbol.map_or(true, |s| o.symbol == *s))
            .cloned()
            .collect())
    }

    async fn get_my_trades(&self, query: &OrderQuery) -> Result<Vec<Trade>> {
        self.enter("get_my_trades")?;
        Ok(self
            .state
            .lock()
            .fills
            .iter()
            .filter(|t| query.symbol.as_ref().map_or(true, |s| t.symbol == *s))
            .cloned()
            .collect())
    }

    async fn subscribe_to_ticker(&self, symbol: &Symbol) -> Result<Subscription<Ticker>> {
        self.enter("subscribe_to_ticker")?;
        let (tx, subscription) =
            Subscription::channel(Topic::symbol(Channel::Ticker, symbol.clone()), CAPACITY);
        self.state.lock().ticker_sinks.push((symbol.clone(), tx));
        Ok(subscription)
    }

    async fn subscribe_to_order_book(&self, symbol: &Symbol) -> Result<Subscription<OrderBook>> {
        self.enter("subscribe_to_order_book")?;
        let (tx, subscription) =
            Subscription::channel(Topic::symbol(Channel::OrderBook, symbol.clone()), CAPACITY);
        self.state.lock().book_sinks.push((symbol.clone(), tx));
        Ok(subscription)
    }

    async fn subscribe_to_trades(&self, symbol: &Symbol) -> Result<Subscription<Trade>> {
        self.enter("subscribe_to_trades")?;
        let (tx, subscription) =
            Subscription::channel(Topic::symbol(Channel::Trades, symbol.clone()), CAPACITY);
        self.state.lock().idle_sinks.push(tx);
        Ok(subscription)
    }

    async fn subscribe_to_ohlcv(
        &self,
        _symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Subscription<Candle>> {
        self.enter("subscribe_to_ohlcv")?;
        Err(self.fail(VenueError::Unsupported(format!("{timeframe} candles"))))
    }

    async fn subscribe_to_orders(&self) -> Result<Subscription<Order>> {
        self.enter("subscribe_to_orders")?;
        Err(self.fail(VenueError::Unsupported("order stream".into())))
    }

    async fn subscribe_to_balances(&self) -> Result<Subscription<Balance>> {
        self.enter("subscribe_to_balances")?;
        Err(self.fail(VenueError::Unsupported("balance stream".into())))
    }

    async fn unsubscribe(&self, channel: Channel, symbol: Option<&Symbol>) -> Result<()> {
        self.enter("unsubscribe")?;
        let mut state = self.state.lock();
        let keep = |s: &Symbol| symbol.is_some_and(|target| target != s);
        match channel {
            Channel::Ticker => state.ticker_sinks.retain(|(s, _)| keep(s)),
            Channel::OrderBook => state.book_sinks.retain(|(s, _)| keep(s)),
            Channel::Trades => state.idle_sinks.clear(),
            _ => {}
        }
        Ok(())
    }
}
