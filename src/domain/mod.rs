//! Venue-agnostic domain types and pure trading logic.

pub mod aggregate;
pub mod arbitrage;
pub mod balance;
pub mod book;
pub mod candle;
pub mod error;
pub mod id;
pub mod market;
pub mod order;
pub mod routing;
pub mod ticker;
pub mod trade;

pub use aggregate::{AggregatedOrderBook, AggregatedTicker, PortfolioBalance};
pub use arbitrage::{ArbitrageConfig, ArbitrageOpportunity, FeeMode};
pub use balance::{Balance, Position};
pub use book::{OrderBook, PriceLevel};
pub use candle::{Candle, Timeframe};
pub use id::{OrderId, Symbol, VenueId};
pub use market::{ExchangeInfo, FeeSchedule, Market, RateQuota};
pub use order::{Order, OrderRequest, OrderStatus, OrderType, Side, TimeInForce};
pub use routing::{RoutingStrategy, SmartOrderRequest, SmartOrderResult};
pub use ticker::Ticker;
pub use trade::{Fee, Trade};
