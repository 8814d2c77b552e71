//! Coinbase Exchange adapter.
//!
//! Requests carry `CB-ACCESS-*` headers signed with the base64 secret and
//! passphrase. Market data streams over the public feed; there is no
//! private stream support.

pub mod client;
pub mod convert;
pub mod dto;
pub mod signer;
pub mod stream;
pub mod symbols;

pub use client::CoinbaseConnector;
