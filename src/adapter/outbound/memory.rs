//! In-memory order store.
//!
//! Keeps every recorded order and fill for the life of the process. Used as
//! the default store and in tests; hosts with durable history plug their own
//! [`OrderStore`] in instead.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{Order, OrderId, Trade, VenueId};
use crate::error::Result;
use crate::port::OrderStore;

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<BTreeMap<(VenueId, OrderId), Order>>,
    trades: RwLock<Vec<Trade>>,
}

impl MemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.read().len()
    }

    #[must_use]
    pub fn trades(&self) -> Vec<Trade> {
        self.trades.read().clone()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn save_order(&self, order: &Order) -> Result<()> {
        self.orders
            .write()
            .insert((order.venue, order.id.clone()), order.clone());
        Ok(())
    }

    async fn get_order(&self, venue: VenueId, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().get(&(venue, id.clone())).cloned())
    }

    async fn list_orders(&self, venue: VenueId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .iter()
            .filter(|((v, _), _)| *v == venue)
            .map(|(_, order)| order.clone())
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn save_trades(&self, trades: &[Trade]) -> Result<()> {
        let mut stored = self.trades.write();
        for trade in trades {
            let duplicate = stored
                .iter()
                .any(|t| t.venue == trade.venue && t.id == trade.id);
            if !duplicate {
                stored.push(trade.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{OrderStatus, Side, Symbol};
    use crate::testkit::domain::{filled_order, trade};

    #[tokio::test]
    async fn saving_replaces_earlier_record() {
        let store = MemoryOrderStore::new();
        let mut order = filled_order(VenueId::Binance, "1", Side::Buy, dec!(1), dec!(100));
        store.save_order(&order).await.unwrap();

        order.updated_at = order.updated_at + chrono::Duration::seconds(1);
        store.save_order(&order).await.unwrap();

        assert_eq!(store.order_count(), 1);
        let loaded = store
            .get_order(VenueId::Binance, &OrderId::new("1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status(), OrderStatus::Closed);
        assert_eq!(loaded.updated_at, order.updated_at);
    }

    #[tokio::test]
    async fn orders_are_listed_per_venue() {
        let store = MemoryOrderStore::new();
        for (venue, id) in [(VenueId::Binance, "a"), (VenueId::Kraken, "b"), (VenueId::Binance, "c")] {
            store
                .save_order(&filled_order(venue, id, Side::Sell, dec!(1), dec!(10)))
                .await
                .unwrap();
        }
        let binance = store.list_orders(VenueId::Binance).await.unwrap();
        assert_eq!(binance.len(), 2);
        assert!(store
            .get_order(VenueId::Coinbase, &OrderId::new("a"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_fills_are_ignored() {
        let store = MemoryOrderStore::new();
        let fill = trade(VenueId::Coinbase, "t1", Symbol::new("BTCUSDT"), dec!(100), dec!(1));
        store.save_trades(&[fill.clone(), fill]).await.unwrap();
        assert_eq!(store.trades().len(), 1);
    }
}
