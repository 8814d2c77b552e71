//! Channel-based streaming subscriptions.
//!
//! Every subscription owns a bounded queue of typed updates. Dropping the
//! [`Subscription`] closes the queue; the producing session notices the
//! closed sink and stops delivering to it.
//!
//! Each queue holds one slot beyond its requested capacity. Events never
//! take that slot, so the terminal [`StreamUpdate::Failed`] always fits even
//! when the subscriber has stopped reading.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::{Balance, Candle, Order, OrderBook, Symbol, Ticker, Timeframe, Trade};
use crate::error::VenueError;

/// Queue slots held back for the terminal failure.
const TERMINAL_SLOTS: usize = 1;

/// Streaming channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Ticker,
    OrderBook,
    Trades,
    Ohlcv(Timeframe),
    Orders,
    Balances,
}

impl Channel {
    /// Private channels need an authenticated session.
    #[must_use]
    pub const fn is_private(self) -> bool {
        matches!(self, Self::Orders | Self::Balances)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticker => f.write_str("ticker"),
            Self::OrderBook => f.write_str("orderbook"),
            Self::Trades => f.write_str("trades"),
            Self::Ohlcv(tf) => write!(f, "ohlcv:{tf}"),
            Self::Orders => f.write_str("orders"),
            Self::Balances => f.write_str("balances"),
        }
    }
}

/// A channel, optionally scoped to one symbol. Sessions key sinks by topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    pub channel: Channel,
    pub symbol: Option<Symbol>,
}

impl Topic {
    #[must_use]
    pub const fn new(channel: Channel, symbol: Option<Symbol>) -> Self {
        Self { channel, symbol }
    }

    #[must_use]
    pub const fn symbol(channel: Channel, symbol: Symbol) -> Self {
        Self::new(channel, Some(symbol))
    }

    #[must_use]
    pub const fn account(channel: Channel) -> Self {
        Self::new(channel, None)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{}:{}", self.channel, symbol),
            None => write!(f, "{}", self.channel),
        }
    }
}

/// A decoded stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Ticker(Ticker),
    OrderBook(OrderBook),
    Trade(Trade),
    Candle(Candle),
    Order(Order),
    Balance(Balance),
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate<T> {
    Event(T),
    /// The session gave up reconnecting; no further updates follow.
    Failed(VenueError),
}

impl<T> StreamUpdate<T> {
    pub fn into_event(self) -> Option<T> {
        match self {
            Self::Event(event) => Some(event),
            Self::Failed(_) => None,
        }
    }
}

/// Receiving half of a subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    topic: Topic,
    rx: mpsc::Receiver<StreamUpdate<T>>,
}

impl<T> Subscription<T> {
    #[must_use]
    pub const fn new(topic: Topic, rx: mpsc::Receiver<StreamUpdate<T>>) -> Self {
        Self { topic, rx }
    }

    /// Create a connected sender/subscription pair. `capacity` events fit
    /// before the queue reports lagging; see [`offer_event`].
    #[must_use]
    pub fn channel(topic: Topic, capacity: usize) -> (mpsc::Sender<StreamUpdate<T>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1) + TERMINAL_SLOTS);
        (tx, Self::new(topic, rx))
    }

    #[must_use]
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Wait for the next update; `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<StreamUpdate<T>> {
        self.rx.recv().await
    }

    /// Stop receiving. Buffered updates remain readable.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = StreamUpdate<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Outcome of offering an event to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Subscriber is not keeping up; the event was dropped for it.
    Lagging,
    Closed,
    /// Event type does not belong on this sink.
    Ignored,
}

/// Type-erased sending half, held by streaming sessions.
#[derive(Debug, Clone)]
pub enum EventSink {
    Ticker(mpsc::Sender<StreamUpdate<Ticker>>),
    OrderBook(mpsc::Sender<StreamUpdate<OrderBook>>),
    Trade(mpsc::Sender<StreamUpdate<Trade>>),
    Candle(mpsc::Sender<StreamUpdate<Candle>>),
    Order(mpsc::Sender<StreamUpdate<Order>>),
    Balance(mpsc::Sender<StreamUpdate<Balance>>),
}

fn offer<T>(tx: &mpsc::Sender<StreamUpdate<T>>, update: StreamUpdate<T>) -> Delivery {
    match tx.try_send(update) {
        Ok(()) => Delivery::Delivered,
        Err(TrySendError::Full(_)) => Delivery::Lagging,
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}

/// Offer an event without touching the terminal slot.
///
/// The reservation holds while the caller is the only producer on `tx`,
/// which is how sessions and feeds own their sinks.
pub fn offer_event<T>(tx: &mpsc::Sender<StreamUpdate<T>>, event: T) -> Delivery {
    if tx.is_closed() {
        return Delivery::Closed;
    }
    if tx.capacity() <= TERMINAL_SLOTS {
        return Delivery::Lagging;
    }
    offer(tx, StreamUpdate::Event(event))
}

/// Offer the terminal failure; it may use the reserved slot.
pub fn offer_failure<T>(tx: &mpsc::Sender<StreamUpdate<T>>, error: VenueError) -> Delivery {
    offer(tx, StreamUpdate::Failed(error))
}

impl EventSink {
    /// Non-blocking delivery; a slow subscriber never stalls the session.
    pub fn deliver(&self, event: &StreamEvent) -> Delivery {
        match (self, event) {
            (Self::Ticker(tx), StreamEvent::Ticker(e)) => offer_event(tx, e.clone()),
            (Self::OrderBook(tx), StreamEvent::OrderBook(e)) => offer_event(tx, e.clone()),
            (Self::Trade(tx), StreamEvent::Trade(e)) => offer_event(tx, e.clone()),
            (Self::Candle(tx), StreamEvent::Candle(e)) => offer_event(tx, e.clone()),
            (Self::Order(tx), StreamEvent::Order(e)) => offer_event(tx, e.clone()),
            (Self::Balance(tx), StreamEvent::Balance(e)) => offer_event(tx, e.clone()),
            _ => Delivery::Ignored,
        }
    }

    /// Deliver the terminal failure. It lands in the reserved slot when the
    /// queue is otherwise full.
    pub fn fail(&self, error: VenueError) -> Delivery {
        match self {
            Self::Ticker(tx) => offer_failure(tx, error),
            Self::OrderBook(tx) => offer_failure(tx, error),
            Self::Trade(tx) => offer_failure(tx, error),
            Self::Candle(tx) => offer_failure(tx, error),
            Self::Order(tx) => offer_failure(tx, error),
            Self::Balance(tx) => offer_failure(tx, error),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Ticker(tx) => tx.is_closed(),
            Self::OrderBook(tx) => tx.is_closed(),
            Self::Trade(tx) => tx.is_closed(),
            Self::Candle(tx) => tx.is_closed(),
            Self::Order(tx) => tx.is_closed(),
            Self::Balance(tx) => tx.is_closed(),
        }
    }
}

/// Types that can be streamed through an [`EventSink`].
pub trait StreamPayload: Sized + Send + 'static {
    fn sink(tx: mpsc::Sender<StreamUpdate<Self>>) -> EventSink;
}

macro_rules! stream_payload {
    ($ty:ty, $variant:ident) => {
        impl StreamPayload for $ty {
            fn sink(tx: mpsc::Sender<StreamUpdate<Self>>) -> EventSink {
                EventSink::$variant(tx)
            }
        }
    };
}

stream_payload!(Ticker, Ticker);
stream_payload!(OrderBook, OrderBook);
stream_payload!(Trade, Trade);
stream_payload!(Candle, Candle);
stream_payload!(Order, Order);
stream_payload!(Balance, Balance);

/// Create a typed subscription together with its erased sink.
#[must_use]
pub fn open_subscription<T: StreamPayload>(topic: Topic, capacity: usize) -> (EventSink, Subscription<T>) {
    let (tx, subscription) = Subscription::channel(topic, capacity);
    (T::sink(tx), subscription)
}
