//! Kraken spot adapter.
//!
//! Private REST calls are form posts signed with HMAC-SHA512 over the path
//! and a hash of nonce plus body. Market data streams over the public
//! WebSocket API; pair names differ between REST and the socket.

pub mod client;
pub mod convert;
pub mod dto;
pub mod signer;
pub mod stream;
pub mod symbols;

pub use client::KrakenConnector;
