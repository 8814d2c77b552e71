//! Binance spot adapter.
//!
//! REST requests are HMAC-SHA256 signed over the query string. Market data
//! streams run on one combined-stream socket; order and balance updates
//! arrive on a user data stream keyed by a listen key that is renewed in the
//! background.

pub mod client;
pub mod convert;
pub mod dto;
pub mod signer;
pub mod stream;
pub mod symbols;
pub mod user_stream;

pub use client::BinanceConnector;
