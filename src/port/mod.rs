//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! - [`ExchangeConnector`]: uniform venue integration
//! - [`Subscription`] and friends: channel-based stream delivery
//! - [`OrderStore`]: persistence of submitted orders and fills

mod exchange;
mod store;
pub mod stream;

pub use exchange::{ExchangeConnector, OrderQuery};
pub use store::OrderStore;
pub use stream::{Channel, StreamEvent, StreamUpdate, Subscription, Topic};
