//! Combined market stream protocol.
//!
//! One socket on `/stream` carries every public topic. Subscriptions are
//! `SUBSCRIBE` method calls naming streams such as `btcusdt@ticker`; data
//! frames arrive wrapped as `{"stream": name, "data": payload}`.

use std::collections::HashMap;

use serde_json::{json, Value};

use super::convert;
use super::dto::{Combined, Depth, WsKlineEvent, WsTicker, WsTrade};
use super::symbols::stream_symbol;
use crate::adapter::outbound::shared::{StreamProtocol, SymbolMap};
use crate::error::VenueError;
use crate::port::{Channel, StreamEvent, Topic};

pub struct MarketProtocol {
    base_url: String,
    symbols: SymbolMap,
    streams: HashMap<String, Topic>,
    next_id: u64,
}

impl MarketProtocol {
    #[must_use]
    pub fn new(base_url: impl Into<String>, symbols: SymbolMap) -> Self {
        Self {
            base_url: base_url.into(),
            symbols,
            streams: HashMap::new(),
            next_id: 1,
        }
    }

    fn stream_name(&self, topic: &Topic) -> Result<String, VenueError> {
        let symbol = topic
            .symbol
            .as_ref()
            .ok_or_else(|| VenueError::Unsupported(format!("{} needs a symbol", topic.channel)))?;
        let prefix = stream_symbol(&self.symbols, symbol);
        Ok(match topic.channel {
            Channel::Ticker => format!("{prefix}@ticker"),
            Channel::OrderBook => format!("{prefix}@depth20@100ms"),
            Channel::Trades => format!("{prefix}@trade"),
            Channel::Ohlcv(tf) => format!("{prefix}@kline_{}", tf.as_str()),
            Channel::Orders | Channel::Balances => {
                return Err(VenueError::Unsupported(format!(
                    "{} is served by the user data stream",
                    topic.channel
                )))
            }
        })
    }

    fn method(&mut self, method: &str, names: Vec<String>) -> String {
        let id = self.next_id;
        self.next_id += 1;
        json!({ "method": method, "params": names, "id": id }).to_string()
    }
}

impl StreamProtocol for MarketProtocol {
    fn url(&self) -> String {
        format!("{}/stream", self.base_url)
    }

    fn subscribe_messages(&mut self, topics: &[Topic]) -> Result<Vec<String>, VenueError> {
        let mut names = Vec::with_capacity(topics.len());
        for topic in topics {
            let name = self.stream_name(topic)?;
            self.streams.insert(name.clone(), topic.clone());
            names.push(name);
        }
        Ok(vec![self.method("SUBSCRIBE", names)])
    }

    fn unsubscribe_messages(&mut self, topics: &[Topic]) -> Result<Vec<String>, VenueError> {
        let mut names = Vec::with_capacity(topics.len());
        for topic in topics {
            let name = self.stream_name(topic)?;
            self.streams.remove(&name);
            names.push(name);
        }
        Ok(vec![self.method("UNSUBSCRIBE", names)])
    }

    fn decode(&mut self, frame: &str) -> Result<Vec<(Topic, StreamEvent)>, VenueError> {
        let value: Value = serde_json::from_str(frame)?;
        if value.get("stream").is_none() {
            // `{"result": null, "id": 1}` acknowledges a method call.
            if let Some(error) = value.get("error") {
                return Err(VenueError::rejected(error.to_string()));
            }
            return Ok(Vec::new());
        }

        let combined: Combined = serde_json::from_value(value)?;
        let Some(topic) = self.streams.get(&combined.stream).cloned() else {
            return Ok(Vec::new());
        };
        let Some(symbol) = topic.symbol.clone() else {
            return Ok(Vec::new());
        };

        let event = match topic.channel {
            Channel::Ticker => {
                let dto: WsTicker = serde_json::from_value(combined.data)?;
                StreamEvent::Ticker(convert::ws_ticker(&dto, symbol)?)
            }
            Channel::OrderBook => {
                let dto: Depth = serde_json::from_value(combined.data)?;
                StreamEvent::OrderBook(convert::order_book(&dto, symbol)?)
            }
            Channel::Trades => {
                let dto: WsTrade = serde_json::from_value(combined.data)?;
                StreamEvent::Trade(convert::ws_trade(&dto, symbol)?)
            }
            Channel::Ohlcv(_) => {
                let dto: WsKlineEvent = serde_json::from_value(combined.data)?;
                StreamEvent::Candle(convert::ws_candle(&dto.kline)?)
            }
            Channel::Orders | Channel::Balances => return Ok(Vec::new()),
        };
        Ok(vec![(topic, event)])
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{Symbol, Timeframe};

    fn protocol() -> MarketProtocol {
        MarketProtocol::new("wss://stream.binance.com:9443", SymbolMap::passthrough())
    }

    fn ticker_topic() -> Topic {
        Topic::symbol(Channel::Ticker, Symbol::new("BTCUSDT"))
    }

    #[test]
    fn subscribe_batches_stream_names() {
        let mut protocol = protocol();
        let messages = protocol
            .subscribe_messages(&[
                ticker_topic(),
                Topic::symbol(Channel::OrderBook, Symbol::new("ETHUSDT")),
                Topic::symbol(Channel::Ohlcv(Timeframe::M5), Symbol::new("ETHUSDT")),
            ])
            .unwrap();
        assert_eq!(messages.len(), 1);
        let value: Value = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(
            value["params"],
            json!(["btcusdt@ticker", "ethusdt@depth20@100ms", "ethusdt@kline_5m"])
        );
        assert_eq!(protocol.url(), "wss://stream.binance.com:9443/stream");
    }

    #[test]
    fn acknowledgements_decode_to_nothing() {
        let mut protocol = protocol();
        assert!(protocol.decode(r#"{"result":null,"id":1}"#).unwrap().is_empty());
    }

    #[test]
    fn ticker_frames_route_to_their_topic() {
        let mut protocol = protocol();
        protocol.subscribe_messages(&[ticker_topic()]).unwrap();
        let frame = r#"{"stream":"btcusdt@ticker","data":{
            "e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","c":"37000.50","b":"37000.00",
            "a":"37001.00","h":"37500","l":"36000","v":"1234.5","o":"36500"}}"#;
        let events = protocol.decode(frame).unwrap();
        assert_eq!(events.len(), 1);
        let (topic, event) = &events[0];
        assert_eq!(topic, &ticker_topic());
        match event {
            StreamEvent::Ticker(t) => {
                assert_eq!(t.bid, dec!(37000));
                assert_eq!(t.ask, dec!(37001));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn depth_frames_become_books() {
        let mut protocol = protocol();
        let topic = Topic::symbol(Channel::OrderBook, Symbol::new("BTCUSDT"));
        protocol.subscribe_messages(&[topic.clone()]).unwrap();
        let frame = r#"{"stream":"btcusdt@depth20@100ms","data":{"lastUpdateId":160,
            "bids":[["0.0024","10"],["0.0025","5"]],"asks":[["0.0026","100"]]}}"#;
        let events = protocol.decode(frame).unwrap();
        match &events[0].1 {
            StreamEvent::OrderBook(book) => {
                assert_eq!(book.nonce, Some(160));
                assert_eq!(book.best_bid().unwrap().price, dec!(0.0025));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unsubscribed_streams_are_ignored() {
        let mut protocol = protocol();
        protocol.subscribe_messages(&[ticker_topic()]).unwrap();
        protocol.unsubscribe_messages(&[ticker_topic()]).unwrap();
        let frame = r#"{"stream":"btcusdt@ticker","data":{}}"#;
        assert!(protocol.decode(frame).unwrap().is_empty());
    }

    #[test]
    fn private_channels_are_rejected() {
        let mut protocol = protocol();
        let err = protocol
            .subscribe_messages(&[Topic::account(Channel::Orders)])
            .unwrap_err();
        assert!(matches!(err, VenueError::Unsupported(_)));
    }
}
