//! Kraken public WebSocket protocol.
//!
//! Data frames are arrays: `[channel_id, payload..., channel_name, pair]`.
//! Book frames carry either a snapshot (`as`/`bs`) or updates (`a`/`b`,
//! possibly split over two payload objects). Everything else is an event
//! object such as `{"event": "heartbeat"}`.

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Value};

use super::convert;
use crate::adapter::outbound::shared::wire::decimal_at;
use crate::adapter::outbound::shared::{StreamProtocol, SymbolMap};
use crate::domain::book::LocalBook;
use crate::domain::{PriceLevel, Side, Symbol, VenueId};
use crate::error::VenueError;
use crate::port::{Channel, StreamEvent, Topic};

/// Subscribed book depth; Kraken accepts 10, 25, 100, 500 or 1000.
pub const BOOK_DEPTH: usize = 25;

pub struct MarketProtocol {
    url: String,
    symbols: SymbolMap,
    books: HashMap<Symbol, LocalBook>,
}

impl MarketProtocol {
    #[must_use]
    pub fn new(url: impl Into<String>, symbols: SymbolMap) -> Self {
        Self {
            url: url.into(),
            symbols,
            books: HashMap::new(),
        }
    }

    fn messages(&self, event: &str, topics: &[Topic]) -> Result<Vec<String>, VenueError> {
        let mut grouped: BTreeMap<String, (Value, Vec<String>)> = BTreeMap::new();
        for topic in topics {
            let symbol = topic
                .symbol
                .as_ref()
                .ok_or_else(|| VenueError::Unsupported(format!("{} needs a symbol", topic.channel)))?;
            let subscription = subscription(topic.channel)?;
            grouped
                .entry(subscription.to_string())
                .or_insert_with(|| (subscription, Vec::new()))
                .1
                .push(self.symbols.to_venue(symbol));
        }
        Ok(grouped
            .into_values()
            .map(|(subscription, pairs)| {
                json!({ "event": event, "pair": pairs, "subscription": subscription }).to_string()
            })
            .collect())
    }

    fn decode_book(&mut self, symbol: Symbol, payloads: &[Value]) -> Result<Option<StreamEvent>, VenueError> {
        let mut snapshot = None;
        let mut updates = Vec::new();
        for payload in payloads {
            if payload.get("as").is_some() || payload.get("bs").is_some() {
                snapshot = Some((rows(payload, "bs")?, rows(payload, "as")?));
            }
            for (key, side) in [("b", Side::Buy), ("a", Side::Sell)] {
                for level in rows(payload, key)? {
                    updates.push((side, level));
                }
            }
        }

        let book = match snapshot {
            Some((bids, asks)) => {
                let book = self.books.entry(symbol.clone()).or_default();
                book.reset(bids, asks);
                book
            }
            // Updates before the snapshot cannot be applied.
            None => match self.books.get_mut(&symbol) {
                Some(book) => book,
                None => return Ok(None),
            },
        };
        for (side, level) in updates {
            book.apply(side, level);
        }
        book.truncate(BOOK_DEPTH);
        Ok(Some(StreamEvent::OrderBook(book.snapshot(
            VenueId::Kraken,
            symbol,
            BOOK_DEPTH,
        ))))
    }
}

fn subscription(channel: Channel) -> Result<Value, VenueError> {
    match channel {
        Channel::Ticker => Ok(json!({ "name": "ticker" })),
        Channel::OrderBook => Ok(json!({ "name": "book", "depth": BOOK_DEPTH })),
        Channel::Trades => Ok(json!({ "name": "trade" })),
        Channel::Ohlcv(tf) => Ok(json!({ "name": "ohlc", "interval": convert::interval(tf)? })),
        Channel::Orders | Channel::Balances => Err(VenueError::Unsupported(format!(
            "kraken does not stream {channel}"
        ))),
    }
}

/// `[price, volume, time, ...]` rows under `key`, if present.
fn rows(payload: &Value, key: &str) -> Result<Vec<PriceLevel>, VenueError> {
    let Some(rows) = payload.get(key).and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    rows.iter()
        .map(|row| {
            let row = row
                .as_array()
                .ok_or_else(|| VenueError::Decode(format!("{key}: expected array row")))?;
            Ok(PriceLevel::new(decimal_at(key, row, 0)?, decimal_at(key, row, 1)?))
        })
        .collect()
}

impl StreamProtocol for MarketProtocol {
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
        let value: Value = serde_json::from_str(frame)?;
        let frame = match value {
            Value::Array(frame) => frame,
            Value::Object(event) => {
                let failed = event.get("event").and_then(Value::as_str) == Some("subscriptionStatus")
                    && event.get("status").and_then(Value::as_str) == Some("error");
                if failed {
                    let message = event
                        .get("errorMessage")
                        .and_then(Value::as_str)
                        .unwrap_or("subscription failed");
                    return Err(VenueError::rejected(message));
                }
                return Ok(Vec::new());
            }
            _ => return Ok(Vec::new()),
        };

        let len = frame.len();
        if len < 4 {
            return Err(VenueError::Decode(format!("frame has {len} elements")));
        }
        let (Some(name), Some(pair)) = (frame[len - 2].as_str(), frame[len - 1].as_str()) else {
            return Err(VenueError::decode("frame lacks channel name or pair"));
        };
        let symbol = self.symbols.from_venue(pair);
        let payloads = &frame[1..len - 2];

        if name == "ticker" {
            let ticker = convert::ticker(&payloads[0], symbol.clone())?;
            return Ok(vec![(Topic::symbol(Channel::Ticker, symbol), StreamEvent::Ticker(ticker))]);
        }
        if name == "trade" {
            let rows: Vec<Vec<Value>> = serde_json::from_value(payloads[0].clone())?;
            let topic = Topic::symbol(Channel::Trades, symbol.clone());
            return rows
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let trade = convert::public_trade(row, symbol.clone(), i)?;
                    Ok((topic.clone(), StreamEvent::Trade(trade)))
                })
                .collect();
        }
        if name.starts_with("book") {
            let topic = Topic::symbol(Channel::OrderBook, symbol.clone());
            return Ok(self
                .decode_book(symbol, payloads)?
                .map(|event| vec![(topic, event)])
                .unwrap_or_default());
        }
        if let Some(minutes) = name.strip_prefix("ohlc-") {
            let timeframe = minutes
                .parse()
                .ok()
                .and_then(convert::timeframe_from_minutes)
                .ok_or_else(|| VenueError::Decode(format!("unknown channel {name}")))?;
            let row: Vec<Value> = serde_json::from_value(payloads[0].clone())?;
            let candle = convert::ws_candle(&row, timeframe)?;
            return Ok(vec![(
                Topic::symbol(Channel::Ohlcv(timeframe), symbol),
                StreamEvent::Candle(candle),
            )]);
        }
        Ok(Vec::new())
    }

    fn on_connect(&mut self) {
        self.books.clear();
    }

    fn heartbeat(&self) -> Option<String> {
        Some(json!({ "event": "ping" }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::adapter::outbound::kraken::symbols::ws_map;
    use crate::domain::{OrderBook, Timeframe};

    fn protocol() -> MarketProtocol {
        MarketProtocol::new("wss://ws.kraken.com", ws_map())
    }

    fn btc() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    fn book_of(events: &[(Topic, StreamEvent)]) -> &OrderBook {
        match &events[0].1 {
            StreamEvent::OrderBook(book) => book,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn subscriptions_group_pairs_per_subscription() {
        let mut protocol = protocol();
        let messages = protocol
            .subscribe_messages(&[
                Topic::symbol(Channel::Ticker, btc()),
                Topic::symbol(Channel::Ticker, Symbol::new("ETHUSDT")),
                Topic::symbol(Channel::Ohlcv(Timeframe::M5), btc()),
            ])
            .unwrap();
        assert_eq!(messages.len(), 2);
        let parsed: Vec<Value> = messages.iter().map(|m| serde_json::from_str(m).unwrap()).collect();
        let ticker = parsed.iter().find(|m| m["subscription"]["name"] == "ticker").unwrap();
        assert_eq!(ticker["pair"], json!(["XBT/USD", "ETH/USD"]));
        let ohlc = parsed.iter().find(|m| m["subscription"]["name"] == "ohlc").unwrap();
        assert_eq!(ohlc["subscription"]["interval"], 5);
    }

    #[test]
    fn private_channels_are_unsupported() {
        assert!(matches!(
            protocol().subscribe_messages(&[Topic::account(Channel::Balances)]),
            Err(VenueError::Unsupported(_))
        ));
    }

    #[test]
    fn book_snapshot_then_updates() {
        let mut protocol = protocol();
        let snapshot = r#"[0,{"as":[["5541.30000","2.50700000","1534614248.123678"]],
            "bs":[["5541.20000","1.52900000","1534614248.765567"],["5539.90000","0.30000000","1534614241.769870"]]},
            "book-25","XBT/USD"]"#;
        let events = protocol.decode(snapshot).unwrap();
        assert_eq!(events[0].0, Topic::symbol(Channel::OrderBook, btc()));
        assert_eq!(book_of(&events).best_bid().unwrap().price, dec!(5541.2));

        let update = r#"[1234,{"a":[["5541.30000","0.00000000","1534614335.345903"]]},
            {"b":[["5541.25000","1.00000000","1534614335.345903","r"]]},"book-25","XBT/USD"]"#;
        let events = protocol.decode(update).unwrap();
        let book = book_of(&events);
        assert!(book.asks.is_empty());
        assert_eq!(book.best_bid().unwrap().price, dec!(5541.25));
        assert_eq!(book.bids.len(), 3);
    }

    #[test]
    fn book_updates_before_snapshot_are_dropped() {
        let mut protocol = protocol();
        let update = r#"[1234,{"a":[["1.0","1.0","1534614335.345903"]]},"book-25","XBT/USD"]"#;
        assert!(protocol.decode(update).unwrap().is_empty());
    }

    #[test]
    fn trade_frames_carry_several_trades() {
        let mut protocol = protocol();
        let frame = r#"[0,[["5541.20000","0.15850568","1534614057.321597","s","l",""],
            ["6060.00000","0.02455000","1534614057.324998","b","l",""]],"trade","XBT/USD"]"#;
        let events = protocol.decode(frame).unwrap();
        assert_eq!(events.len(), 2);
        match &events[1].1 {
            StreamEvent::Trade(trade) => {
                assert_eq!(trade.side, Side::Buy);
                assert_eq!(trade.price, dec!(6060));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn ohlc_frames_map_to_candle_topics() {
        let mut protocol = protocol();
        let frame = r#"[42,["1542057314.748456","1542057360.435743","3586.70000","3586.70000",
            "3586.60000","3586.60000","3586.68894","0.03373000",2],"ohlc-5","XBT/USD"]"#;
        let events = protocol.decode(frame).unwrap();
        assert_eq!(events[0].0, Topic::symbol(Channel::Ohlcv(Timeframe::M5), btc()));
    }

    #[test]
    fn events_are_ignored_unless_subscription_failed() {
        let mut protocol = protocol();
        assert!(protocol.decode(r#"{"event":"heartbeat"}"#).unwrap().is_empty());
        let failed = r#"{"event":"subscriptionStatus","status":"error","errorMessage":"Currency pair not supported"}"#;
        assert!(protocol.decode(failed).is_err());
        assert_eq!(protocol.heartbeat().as_deref(), Some(r#"{"event":"ping"}"#));
    }
}
