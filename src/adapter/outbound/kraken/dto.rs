//! Kraken wire types.
//!
//! Every REST response is wrapped in `{"error": [...], "result": ...}`;
//! a non-empty error list means failure even with HTTP 200.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub error: Vec<String>,
    pub result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct AssetPair {
    pub altname: String,
    #[serde(default)]
    pub wsname: Option<String>,
    pub base: String,
    pub quote: String,
    pub pair_decimals: u32,
    pub lot_decimals: u32,
    #[serde(default)]
    pub ordermin: Option<String>,
    #[serde(default)]
    pub costmin: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Ticker fields are arrays keyed by letter: `a`/`b` = `[price, whole lot,
/// lot]`, `c` = `[price, lot]`, `v`/`l`/`h` = `[today, last 24 hours]`. The
/// WebSocket feed sends the same shape with some numbers unquoted, so both
/// are read as raw values.
pub type TickerInfo = Value;

/// Rows are `[price, volume, timestamp]`.
#[derive(Debug, Deserialize)]
pub struct DepthInfo {
    pub bids: Vec<Vec<Value>>,
    pub asks: Vec<Vec<Value>>,
}

/// `{"<pair>": rows, "last": cursor}`, shared by `Trades` and `OHLC`.
pub type PairRows = BTreeMap<String, Value>;

#[derive(Debug, Deserialize)]
pub struct BalanceEntry {
    pub balance: String,
    #[serde(default)]
    pub hold_trade: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddOrderResult {
    pub txid: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelResult {
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct OrderDescription {
    pub pair: String,
    #[serde(rename = "type")]
    pub side: String,
    pub ordertype: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub price2: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderInfo {
    pub status: String,
    pub opentm: f64,
    #[serde(default)]
    pub closetm: Option<f64>,
    pub descr: OrderDescription,
    pub vol: String,
    pub vol_exec: String,
    #[serde(default)]
    pub cost: Option<String>,
    #[serde(default)]
    pub fee: Option<String>,
    /// Average fill price.
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub cl_ord_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenOrders {
    pub open: BTreeMap<String, OrderInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ClosedOrders {
    pub closed: BTreeMap<String, OrderInfo>,
}

#[derive(Debug, Deserialize)]
pub struct TradeInfo {
    pub ordertxid: String,
    pub pair: String,
    pub time: f64,
    #[serde(rename = "type")]
    pub side: String,
    pub price: String,
    pub fee: String,
    pub vol: String,
    #[serde(default)]
    pub maker: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TradesHistory {
    pub trades: BTreeMap<String, TradeInfo>,
}
