//! Store port for order and fill persistence.
//!
//! The gateway records what it submits; long-lived history lives behind this
//! trait in whatever store the host process provides.

use async_trait::async_trait;

use crate::domain::{Order, OrderId, Trade, VenueId};
use crate::error::Result;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Save an order, replacing any earlier record with the same venue and id.
    async fn save_order(&self, order: &Order) -> Result<()>;

    async fn get_order(&self, venue: VenueId, id: &OrderId) -> Result<Option<Order>>;

    /// All orders recorded for a venue, oldest first.
    async fn list_orders(&self, venue: VenueId) -> Result<Vec<Order>>;

    async fn save_trades(&self, trades: &[Trade]) -> Result<()>;
}
