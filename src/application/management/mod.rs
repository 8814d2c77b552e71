//! Multi-venue management service.
//!
//! [`ExchangeManagementService`] owns one connector per enabled venue and
//! exposes the venue-agnostic operations: portfolio and market-data
//! aggregation, arbitrage scanning, smart order routing, and aggregated
//! streaming.
//!
//! # Architecture
//!
//! ```text
//! ExchangeConfig --(ConnectorFactory)--> Arc<dyn ExchangeConnector>
//!                                              |
//!                   ExchangeManagementService -+-- aggregation (fan-out/fan-in)
//!                                              +-- routing -> OrderStore
//!                                              +-- streaming feeds
//! ```
//!
//! A venue that fails inside a multi-venue call is logged and left out of
//! the result. Single-venue calls propagate the venue's error as is.

mod aggregation;
mod routing;
mod streaming;

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::RwLock;
use tracing::{info, warn};

use self::streaming::StreamRegistry;
use super::factory::ConnectorFactory;
use crate::domain::{ArbitrageConfig, Order, OrderId, Symbol, VenueId};
use crate::error::{Error, Result};
use crate::infrastructure::config::{ExchangeConfig, Settings};
use crate::port::{ExchangeConnector, OrderStore};

const DEFAULT_STREAM_CAPACITY: usize = 1024;

pub struct ExchangeManagementService {
    /// Every configured venue, enabled or not.
    configs: RwLock<BTreeMap<VenueId, ExchangeConfig>>,
    /// Connected venues only.
    connectors: RwLock<BTreeMap<VenueId, Arc<dyn ExchangeConnector>>>,
    factory: Arc<dyn ConnectorFactory>,
    store: Arc<dyn OrderStore>,
    /// Symbol of every live order routed through this service, for cancels.
    /// Terminal orders leave the index; the store still has them.
    orders: DashMap<(VenueId, OrderId), Symbol>,
    arbitrage: ArbitrageConfig,
    streams: StreamRegistry,
    stream_capacity: usize,
}

impl ExchangeManagementService {
    pub fn new(
        configs: Vec<ExchangeConfig>,
        factory: Arc<dyn ConnectorFactory>,
        store: Arc<dyn OrderStore>,
    ) -> Self {
        let configs = configs.into_iter().map(|c| (c.name, c)).collect();
        Self {
            configs: RwLock::new(configs),
            connectors: RwLock::new(BTreeMap::new()),
            factory,
            store,
            orders: DashMap::new(),
            arbitrage: ArbitrageConfig::default(),
            streams: StreamRegistry::default(),
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    /// Build from loaded settings: venues, arbitrage and stream parameters.
    pub fn from_settings(
        settings: &Settings,
        factory: Arc<dyn ConnectorFactory>,
        store: Arc<dyn OrderStore>,
    ) -> Self {
        Self::new(settings.exchanges.clone(), factory, store)
            .with_arbitrage(settings.arbitrage.clone())
            .with_stream_capacity(settings.stream.channel_capacity)
    }

    #[must_use]
    pub fn with_arbitrage(mut self, arbitrage: ArbitrageConfig) -> Self {
        self.arbitrage = arbitrage;
        self
    }

    #[must_use]
    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }

    /// Connect every enabled venue concurrently.
    ///
    /// Venues that fail to connect are logged and excluded; the service
    /// carries on with the rest. Returns the venues now connected.
    pub async fn initialize(&self) -> Vec<VenueId> {
        let pending: Vec<ExchangeConfig> = {
            let connected = self.connectors.read();
            self.configs
                .read()
                .values()
                .filter(|c| c.enabled && !connected.contains_key(&c.name))
                .cloned()
                .collect()
        };

        let results = join_all(pending.iter().map(|config| self.open(config))).await;
        for (config, result) in pending.iter().zip(results) {
            match result {
                Ok(connector) => {
                    info!(venue = %config.name, "Exchange connected");
                    self.connectors.write().insert(config.name, connector);
                }
                Err(e) => {
                    warn!(venue = %config.name, error = %e, "Exchange failed to connect, excluded");
                }
            }
        }

        let connected = self.get_connected_exchanges();
        if connected.is_empty() {
            warn!("No exchange connected");
        }
        connected
    }

    /// Add or replace a venue's configuration.
    ///
    /// Any existing connector for the venue is disconnected first. An
    /// enabled venue is reconnected with the new settings and its connect
    /// error, if any, is returned.
    pub async fn configure_exchange(&self, config: ExchangeConfig) -> Result<()> {
        let venue = config.name;
        self.configs.write().insert(venue, config.clone());

        let previous = self.connectors.write().remove(&venue);
        if let Some(previous) = previous {
            if let Err(e) = previous.disconnect().await {
                warn!(venue = %venue, error = %e, "Disconnect of replaced connector failed");
            }
        }

        if !config.enabled {
            info!(venue = %venue, "Exchange disabled");
            return Ok(());
        }
        let connector = self.open(&config).await?;
        self.connectors.write().insert(venue, connector);
        info!(venue = %venue, "Exchange reconfigured");
        Ok(())
    }

    #[must_use]
    pub fn get_exchange_configs(&self) -> Vec<ExchangeConfig> {
        self.configs.read().values().cloned().collect()
    }

    /// Venues with a live connector.
    #[must_use]
    pub fn get_connected_exchanges(&self) -> Vec<VenueId> {
        self.connectors
            .read()
            .iter()
            .filter(|(_, c)| c.is_connected())
            .map(|(venue, _)| *venue)
            .collect()
    }

    /// The connector for `venue`, if connected.
    pub fn connector(&self, venue: VenueId) -> Result<Arc<dyn ExchangeConnector>> {
        self.connectors
            .read()
            .get(&venue)
            .filter(|c| c.is_connected())
            .cloned()
            .ok_or(Error::NotConnected(venue))
    }

    /// Cancel an order by venue and id.
    ///
    /// The symbol is recovered from orders routed through this service, then
    /// from the order store.
    pub async fn cancel_order(&self, venue: VenueId, order_id: &OrderId) -> Result<Order> {
        let connector = self.connector(venue)?;
        let key = (venue, order_id.clone());
        let indexed = self.orders.get(&key).map(|entry| entry.value().clone());
        let symbol = match indexed {
            Some(symbol) => symbol,
            None => match self.store.get_order(venue, order_id).await? {
                Some(order) => order.symbol,
                None => {
                    return Err(Error::UnknownOrder {
                        venue,
                        order_id: order_id.clone(),
                    })
                }
            },
        };

        let order = connector.cancel_order(order_id, &symbol).await?;
        info!(venue = %venue, order_id = %order_id, status = %order.status(), "Order canceled");
        self.record(&order).await;
        Ok(order)
    }

    /// Stop every aggregated feed and disconnect every venue.
    pub async fn disconnect(&self) {
        self.streams.shutdown();
        let connectors: Vec<_> = std::mem::take(&mut *self.connectors.write())
            .into_values()
            .collect();
        let results = join_all(connectors.iter().map(|c| c.disconnect())).await;
        for (connector, result) in connectors.iter().zip(results) {
            match result {
                Ok(()) => info!(venue = %connector.venue(), "Exchange disconnected"),
                Err(e) => warn!(venue = %connector.venue(), error = %e, "Disconnect failed"),
            }
        }
    }

    async fn open(&self, config: &ExchangeConfig) -> Result<Arc<dyn ExchangeConnector>> {
        let connector = self.factory.create(config)?;
        connector.connect().await?;
        Ok(connector)
    }

    /// Connected venues allowed to trade `symbol`, in venue order.
    fn participants(&self, symbol: &Symbol) -> Vec<Arc<dyn ExchangeConnector>> {
        let configs = self.configs.read();
        self.connectors
            .read()
            .iter()
            .filter(|(venue, c)| {
                c.is_connected() && configs.get(*venue).map_or(true, |cfg| cfg.allows(symbol))
            })
            .map(|(_, c)| Arc::clone(c))
            .collect()
    }

    /// Connected venues regardless of symbol allowlists.
    fn connected(&self) -> Vec<Arc<dyn ExchangeConnector>> {
        self.connectors
            .read()
            .values()
            .filter(|c| c.is_connected())
            .cloned()
            .collect()
    }

    fn config(&self, venue: VenueId) -> Option<ExchangeConfig> {
        self.configs.read().get(&venue).cloned()
    }

    /// Index a live order for later cancels and persist it.
    async fn record(&self, order: &Order) {
        let key = (order.venue, order.id.clone());
        if order.is_terminal() {
            self.orders.remove(&key);
        } else {
            self.orders.insert(key, order.symbol.clone());
        }
        if let Err(e) = self.store.save_order(order).await {
            warn!(venue = %order.venue, order_id = %order.id, error = %e, "Failed to persist order");
        }
    }
}

/// Keep a venue's answer, or log and leave the venue out.
fn keep<T>(connector: &dyn ExchangeConnector, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(venue = %connector.venue(), error = %e, "Venue excluded");
            None
        }
    }
}

fn no_venue(symbol: &Symbol) -> Error {
    Error::NoVenueAvailable {
        symbol: symbol.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::adapter::outbound::memory::MemoryOrderStore;
    use crate::domain::{OrderRequest, OrderStatus, Side};
    use crate::error::VenueError;
    use crate::testkit::connector::MockConnector;
    use crate::testkit::domain::{btc, open_order, ticker};
    use crate::testkit::service::MockFactory;

    pub(crate) use crate::testkit::service::service;

    // -------------------------------------------------------------------------
    // Lifecycle Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn initialize_excludes_failing_venues() {
        let (service, _) = service(vec![
            MockConnector::new(VenueId::Binance),
            MockConnector::new(VenueId::Kraken).failing("connect", VenueError::Network("refused".into())),
        ])
        .await;

        assert_eq!(service.get_connected_exchanges(), vec![VenueId::Binance]);
        assert!(matches!(
            service.connector(VenueId::Kraken),
            Err(Error::NotConnected(VenueId::Kraken))
        ));
        assert_eq!(service.get_exchange_configs().len(), 2);
    }

    #[tokio::test]
    async fn disabled_venues_are_not_connected() {
        let factory = Arc::new(MockFactory::new(vec![
            MockConnector::new(VenueId::Binance),
            MockConnector::new(VenueId::Coinbase),
        ]));
        let service = ExchangeManagementService::new(
            vec![
                ExchangeConfig::new(VenueId::Binance),
                ExchangeConfig::new(VenueId::Coinbase).with_enabled(false),
            ],
            Arc::clone(&factory) as Arc<dyn ConnectorFactory>,
            Arc::new(MemoryOrderStore::new()),
        );

        assert_eq!(service.initialize().await, vec![VenueId::Binance]);
        assert_eq!(factory.mock(VenueId::Coinbase).calls("connect"), 0);
    }

    #[tokio::test]
    async fn configure_exchange_reconnects_and_disables() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let mock = factory.mock(VenueId::Binance);

        service
            .configure_exchange(ExchangeConfig::new(VenueId::Binance).with_priority(9))
            .await
            .unwrap();
        assert_eq!(mock.calls("disconnect"), 1);
        assert_eq!(mock.calls("connect"), 2);
        assert_eq!(service.get_exchange_configs()[0].priority, 9);

        service
            .configure_exchange(ExchangeConfig::new(VenueId::Binance).with_enabled(false))
            .await
            .unwrap();
        assert!(service.get_connected_exchanges().is_empty());
    }

    #[tokio::test]
    async fn disconnect_closes_every_venue() {
        let (service, factory) = service(vec![
            MockConnector::new(VenueId::Binance),
            MockConnector::new(VenueId::Coinbase),
        ])
        .await;
        service.disconnect().await;
        assert!(service.get_connected_exchanges().is_empty());
        assert_eq!(factory.mock(VenueId::Coinbase).calls("disconnect"), 1);
    }

    // -------------------------------------------------------------------------
    // Cancel Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn cancel_uses_the_routed_order_symbol() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance).resting()]).await;
        let mock = factory.mock(VenueId::Binance);
        let order = mock
            .create_order(&OrderRequest::limit(btc(), Side::Buy, dec!(1), dec!(90)))
            .await
            .unwrap();
        service.record(&order).await;

        let canceled = service.cancel_order(VenueId::Binance, &order.id).await.unwrap();
        assert_eq!(canceled.status(), OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn terminal_orders_leave_the_cancel_index() {
        let (service, factory) = service(vec![
            MockConnector::new(VenueId::Binance).resting(),
            MockConnector::new(VenueId::Kraken),
        ])
        .await;

        let filled = factory
            .mock(VenueId::Kraken)
            .create_order(&OrderRequest::limit(btc(), Side::Buy, dec!(1), dec!(95)))
            .await
            .unwrap();
        service.record(&filled).await;
        assert!(service.orders.is_empty());

        let resting = factory
            .mock(VenueId::Binance)
            .create_order(&OrderRequest::limit(btc(), Side::Buy, dec!(1), dec!(90)))
            .await
            .unwrap();
        service.record(&resting).await;
        assert_eq!(service.orders.len(), 1);

        service.cancel_order(VenueId::Binance, &resting.id).await.unwrap();
        assert!(service.orders.is_empty());
        let stored = service.store.get_order(VenueId::Binance, &resting.id).await.unwrap();
        assert_eq!(stored.map(|o| o.status()), Some(OrderStatus::Canceled));
    }

    #[tokio::test]
    async fn cancel_falls_back_to_the_store() {
        let mock = MockConnector::new(VenueId::Kraken).resting();
        let order = mock
            .create_order(&OrderRequest::limit(btc(), Side::Sell, dec!(1), dec!(110)))
            .await
            .unwrap();
        let store = Arc::new(MemoryOrderStore::new());
        store.save_order(&order).await.unwrap();
        let service = ExchangeManagementService::new(
            vec![ExchangeConfig::new(VenueId::Kraken)],
            Arc::new(MockFactory::new(vec![mock])),
            store,
        );
        service.initialize().await;

        let canceled = service.cancel_order(VenueId::Kraken, &order.id).await.unwrap();
        assert_eq!(canceled.status(), OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn cancel_of_unknown_order_is_rejected_locally() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let err = service
            .cancel_order(VenueId::Binance, &OrderId::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownOrder { venue: VenueId::Binance, .. }));
        assert_eq!(factory.mock(VenueId::Binance).calls("cancel_order"), 0);
    }

    #[tokio::test]
    async fn cancel_on_disconnected_venue_fails() {
        let (service, _) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let stored = open_order(VenueId::Coinbase, "c1", Side::Buy, dec!(1), dec!(1));
        let err = service.cancel_order(VenueId::Coinbase, &stored.id).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected(VenueId::Coinbase)));
    }

    #[tokio::test]
    async fn participants_honor_symbol_allowlists() {
        let factory = Arc::new(MockFactory::new(vec![
            MockConnector::new(VenueId::Binance).with_ticker(ticker(VenueId::Binance, btc(), dec!(1), dec!(2))),
            MockConnector::new(VenueId::Kraken),
        ]));
        let service = ExchangeManagementService::new(
            vec![
                ExchangeConfig::new(VenueId::Binance),
                ExchangeConfig::new(VenueId::Kraken).with_symbols(vec![Symbol::new("ETHUSDT")]),
            ],
            factory,
            Arc::new(MemoryOrderStore::new()),
        );
        service.initialize().await;

        let venues: Vec<VenueId> = service.participants(&btc()).iter().map(|c| c.venue()).collect();
        assert_eq!(venues, vec![VenueId::Binance]);
        assert_eq!(service.connected().len(), 2);
    }
}
