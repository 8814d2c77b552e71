//! Outbound adapters (driven side).

pub mod binance;
pub mod coinbase;
pub mod kraken;
pub mod memory;
pub mod shared;
