//! Coinbase Exchange feed protocol.
//!
//! Public channels only: `ticker`, `level2` and `matches`. The level 2
//! channel sends one snapshot followed by incremental changes, which are
//! folded into a local book; subscribers always receive full books.

use std::collections::{BTreeMap, HashMap};

use serde_json::json;

use super::convert;
use super::dto::FeedMessage;
use crate::adapter::outbound::shared::{StreamProtocol, SymbolMap};
use crate::domain::book::LocalBook;
use crate::domain::{Symbol, VenueId};
use crate::error::VenueError;
use crate::port::{Channel, StreamEvent, Topic};

/// Levels per side published from the local book.
pub const BOOK_DEPTH: usize = 50;

pub struct FeedProtocol {
    url: String,
    symbols: SymbolMap,
    books: HashMap<Symbol, LocalBook>,
}

impl FeedProtocol {
    #[must_use]
    pub fn new(url: impl Into<String>, symbols: SymbolMap) -> Self {
        Self {
            url: url.into(),
            symbols,
            books: HashMap::new(),
        }
    }

    fn messages(&self, kind: &str, topics: &[Topic]) -> Result<Vec<String>, VenueError> {
        let mut by_channel: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for topic in topics {
            let channel = channel_name(topic.channel)?;
            let symbol = topic
                .symbol
                .as_ref()
                .ok_or_else(|| VenueError::Unsupported(format!("{} needs a symbol", topic.channel)))?;
            by_channel
                .entry(channel)
                .or_default()
                .push(self.symbols.to_venue(symbol));
        }
        Ok(by_channel
            .into_iter()
            .map(|(channel, products)| {
                json!({ "type": kind, "product_ids": products, "channels": [channel] }).to_string()
            })
            .collect())
    }
}

fn channel_name(channel: Channel) -> Result<&'static str, VenueError> {
    match channel {
        Channel::Ticker => Ok("ticker"),
        Channel::OrderBook => Ok("level2"),
        Channel::Trades => Ok("matches"),
        Channel::Ohlcv(_) | Channel::Orders | Channel::Balances => Err(VenueError::Unsupported(
            format!("coinbase does not stream {channel}"),
        )),
    }
}

impl StreamProtocol for FeedProtocol {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn subscribe_messages(&mut self, topics: &[Topic]) -> Result<Vec<String>, VenueError> {
        self.messages("subscribe", topics)
    }

    fn unsubscribe_messages(&mut self, topics: &[Topic]) -> Result<Vec<String>, VenueError> {
        for topic in topics {
            if let (Channel::OrderBook, Some(symbol)) = (topic.channel, &topic.symbol) {
                self.books.remove(symbol);
            }
        }
        self.messages("unsubscribe", topics)
    }

    fn decode(&mut self, frame: &str) -> Result<Vec<(Topic, StreamEvent)>, VenueError> {
        let event = match serde_json::from_str::<FeedMessage>(frame)? {
            FeedMessage::Ticker(dto) => {
                let symbol = self.symbols.from_venue(&dto.product_id);
                let ticker = convert::feed_ticker(&dto, symbol.clone())?;
                (Topic::symbol(Channel::Ticker, symbol), StreamEvent::Ticker(ticker))
            }
            FeedMessage::Match(dto) | FeedMessage::LastMatch(dto) => {
                let symbol = self.symbols.from_venue(&dto.product_id);
                let trade = convert::feed_match(&dto, symbol.clone())?;
                (Topic::symbol(Channel::Trades, symbol), StreamEvent::Trade(trade))
            }
            FeedMessage::Snapshot(dto) => {
                let symbol = self.symbols.from_venue(&dto.product_id);
                let bids = convert::feed_levels("bids", &dto.bids)?;
                let asks = convert::feed_levels("asks", &dto.asks)?;
                let book = self.books.entry(symbol.clone()).or_default();
                book.reset(bids, asks);
                let snapshot = book.snapshot(VenueId::Coinbase, symbol.clone(), BOOK_DEPTH);
                (Topic::symbol(Channel::OrderBook, symbol), StreamEvent::OrderBook(snapshot))
            }
            FeedMessage::L2update(dto) => {
                let symbol = self.symbols.from_venue(&dto.product_id);
                // Changes before the snapshot cannot be applied.
                let Some(book) = self.books.get_mut(&symbol) else {
                    return Ok(Vec::new());
                };
                for change in &dto.changes {
                    let (side, level) = convert::feed_change(change)?;
                    book.apply(side, level);
                }
                let snapshot = book.snapshot(VenueId::Coinbase, symbol.clone(), BOOK_DEPTH);
                (Topic::symbol(Channel::OrderBook, symbol), StreamEvent::OrderBook(snapshot))
            }
            FeedMessage::Error(error) => {
                let message = match error.reason {
                    Some(reason) => format!("{}: {reason}", error.message),
                    None => error.message,
                };
                return Err(VenueError::rejected(message));
            }
            FeedMessage::Other => return Ok(Vec::new()),
        };
        Ok(vec![event])
    }

    fn on_connect(&mut self) {
        // A new connection starts with fresh snapshots.
        self.books.clear();
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::Value;

    use super::*;
    use crate::adapter::outbound::coinbase::symbols::symbol_map;
    use crate::domain::Timeframe;

    fn protocol() -> FeedProtocol {
        FeedProtocol::new("wss://ws-feed.exchange.coinbase.com", symbol_map())
    }

    fn book_topic() -> Topic {
        Topic::symbol(Channel::OrderBook, Symbol::new("BTCUSDT"))
    }

    fn book_of(events: &[(Topic, StreamEvent)]) -> &crate::domain::OrderBook {
        match &events[0].1 {
            StreamEvent::OrderBook(book) => book,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn subscriptions_group_products_by_channel() {
        let mut protocol = protocol();
        let messages = protocol
            .subscribe_messages(&[
                Topic::symbol(Channel::Ticker, Symbol::new("BTCUSDT")),
                Topic::symbol(Channel::Ticker, Symbol::new("ETHUSDT")),
                book_topic(),
            ])
            .unwrap();
        assert_eq!(messages.len(), 2);
        let level2: Value = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(level2["channels"], json!(["level2"]));
        let ticker: Value = serde_json::from_str(&messages[1]).unwrap();
        assert_eq!(ticker["type"], "subscribe");
        assert_eq!(ticker["product_ids"], json!(["BTC-USDT", "ETH-USDT"]));
    }

    #[test]
    fn candles_and_private_channels_are_unsupported() {
        let mut protocol = protocol();
        for topic in [
            Topic::symbol(Channel::Ohlcv(Timeframe::M1), Symbol::new("BTCUSDT")),
            Topic::account(Channel::Orders),
        ] {
            assert!(matches!(
                protocol.subscribe_messages(&[topic]),
                Err(VenueError::Unsupported(_))
            ));
        }
    }

    #[test]
    fn level2_updates_fold_into_snapshot() {
        let mut protocol = protocol();
        let snapshot = r#"{"type":"snapshot","product_id":"BTC-USDT",
            "bids":[["100.00","1.0"],["99.00","2.0"]],"asks":[["101.00","1.5"]]}"#;
        let events = protocol.decode(snapshot).unwrap();
        assert_eq!(events[0].0, book_topic());
        assert_eq!(book_of(&events).best_bid().unwrap().price, dec!(100));

        let update = r#"{"type":"l2update","product_id":"BTC-USDT","time":"2023-11-14T22:13:20.000Z",
            "changes":[["buy","100.00","0"],["sell","100.50","3.0"]]}"#;
        let events = protocol.decode(update).unwrap();
        let book = book_of(&events);
        assert_eq!(book.best_bid().unwrap().price, dec!(99));
        assert_eq!(book.best_ask().unwrap().price, dec!(100.5));
        assert_eq!(book.asks.len(), 2);
    }

    #[test]
    fn updates_before_snapshot_are_dropped() {
        let mut protocol = protocol();
        let update = r#"{"type":"l2update","product_id":"BTC-USDT","changes":[["buy","1","1"]]}"#;
        assert!(protocol.decode(update).unwrap().is_empty());
    }

    #[test]
    fn reconnect_discards_local_books() {
        let mut protocol = protocol();
        protocol
            .decode(r#"{"type":"snapshot","product_id":"BTC-USDT","bids":[],"asks":[]}"#)
            .unwrap();
        protocol.on_connect();
        let update = r#"{"type":"l2update","product_id":"BTC-USDT","changes":[["buy","1","1"]]}"#;
        assert!(protocol.decode(update).unwrap().is_empty());
    }

    #[test]
    fn matches_become_trades() {
        let mut protocol = protocol();
        let frame = r#"{"type":"match","trade_id":10,"product_id":"ETH-USDT","price":"2000.5",
            "size":"0.1","side":"sell","time":"2023-11-14T22:13:20.000Z"}"#;
        let events = protocol.decode(frame).unwrap();
        assert_eq!(events[0].0, Topic::symbol(Channel::Trades, Symbol::new("ETHUSDT")));
        match &events[0].1 {
            StreamEvent::Trade(trade) => assert_eq!(trade.price, dec!(2000.5)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn feed_errors_surface_and_control_frames_are_ignored() {
        let mut protocol = protocol();
        assert!(protocol
            .decode(r#"{"type":"subscriptions","channels":[]}"#)
            .unwrap()
            .is_empty());
        assert!(protocol
            .decode(r#"{"type":"error","message":"Failed to subscribe","reason":"bad product"}"#)
            .is_err());
    }
}
