//! Coinbase Exchange wire types.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Product {
    pub id: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub quote_increment: String,
    pub base_increment: String,
    #[serde(default)]
    pub base_min_size: Option<String>,
    #[serde(default)]
    pub base_max_size: Option<String>,
    #[serde(default)]
    pub min_market_funds: Option<String>,
    pub status: String,
    #[serde(default)]
    pub trading_disabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProductTicker {
    pub price: String,
    pub bid: String,
    pub ask: String,
    pub volume: String,
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductStats {
    pub high: String,
    pub low: String,
}

/// `[price, size, num_orders]` on level 2.
pub type RawLevel = (String, String, Value);

#[derive(Debug, Deserialize)]
pub struct Book {
    pub sequence: u64,
    pub bids: Vec<RawLevel>,
    pub asks: Vec<RawLevel>,
}

#[derive(Debug, Deserialize)]
pub struct PublicTrade {
    pub trade_id: u64,
    pub price: String,
    pub size: String,
    /// Side of the resting (maker) order.
    pub side: String,
    pub time: String,
}

/// Candle row: `[time, low, high, open, close, volume]`, time in seconds.
pub type CandleRow = Vec<Value>;

#[derive(Debug, Deserialize)]
pub struct Account {
    pub currency: String,
    pub balance: String,
    pub available: String,
    pub hold: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub product_id: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    /// Market buys may be sized in quote currency instead.
    #[serde(default)]
    pub funds: Option<String>,
    #[serde(default)]
    pub stop: Option<String>,
    #[serde(default)]
    pub stop_price: Option<String>,
    #[serde(default)]
    pub client_oid: Option<String>,
    pub status: String,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub filled_size: Option<String>,
    #[serde(default)]
    pub executed_value: Option<String>,
    #[serde(default)]
    pub fill_fees: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub done_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Fill {
    pub trade_id: u64,
    pub product_id: String,
    pub order_id: String,
    pub price: String,
    pub size: String,
    pub fee: String,
    /// `M` for maker, `T` for taker.
    pub liquidity: String,
    pub side: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub message: String,
}

// -----------------------------------------------------------------------------
// Feed
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Ticker(FeedTicker),
    Snapshot(FeedSnapshot),
    L2update(FeedL2Update),
    Match(FeedMatch),
    LastMatch(FeedMatch),
    Error(FeedError),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct FeedTicker {
    pub product_id: String,
    pub price: String,
    pub best_bid: String,
    pub best_ask: String,
    pub high_24h: String,
    pub low_24h: String,
    pub volume_24h: String,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedSnapshot {
    pub product_id: String,
    pub bids: Vec<[String; 2]>,
    pub asks: Vec<[String; 2]>,
}

/// Changes are `[side, price, size]`; a zero size removes the level.
#[derive(Debug, Deserialize)]
pub struct FeedL2Update {
    pub product_id: String,
    pub changes: Vec<[String; 3]>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedMatch {
    pub trade_id: u64,
    pub product_id: String,
    pub price: String,
    pub size: String,
    pub side: String,
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedError {
    pub message: String,
    #[serde(default)]
    pub reason: Option<String>,
}
