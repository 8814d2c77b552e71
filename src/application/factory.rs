//! Connector construction.
//!
//! The management service never names a concrete adapter; it asks a
//! [`ConnectorFactory`] for one per configured venue. Tests supply factories
//! that hand out scripted connectors.

use std::sync::Arc;

use crate::adapter::outbound::binance::BinanceConnector;
use crate::adapter::outbound::coinbase::CoinbaseConnector;
use crate::adapter::outbound::kraken::KrakenConnector;
use crate::adapter::outbound::shared::ConnectorOptions;
use crate::domain::VenueId;
use crate::error::Result;
use crate::infrastructure::config::ExchangeConfig;
use crate::port::ExchangeConnector;

pub trait ConnectorFactory: Send + Sync {
    fn create(&self, config: &ExchangeConfig) -> Result<Arc<dyn ExchangeConnector>>;
}

/// Builds the real venue adapters.
pub struct VenueConnectorFactory {
    options: ConnectorOptions,
}

impl VenueConnectorFactory {
    #[must_use]
    pub const fn new(options: ConnectorOptions) -> Self {
        Self { options }
    }
}

impl ConnectorFactory for VenueConnectorFactory {
    fn create(&self, config: &ExchangeConfig) -> Result<Arc<dyn ExchangeConnector>> {
        let connector: Arc<dyn ExchangeConnector> = match config.name {
            VenueId::Binance => Arc::new(BinanceConnector::new(config.clone(), &self.options)),
            VenueId::Coinbase => Arc::new(CoinbaseConnector::new(config.clone(), &self.options)),
            VenueId::Kraken => Arc::new(KrakenConnector::new(config.clone(), &self.options)),
        };
        Ok(connector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_an_adapter_per_venue() {
        let factory = VenueConnectorFactory::new(ConnectorOptions::default());
        for venue in VenueId::ALL {
            let connector = factory.create(&ExchangeConfig::new(venue)).unwrap();
            assert_eq!(connector.venue(), venue);
            assert!(!connector.is_connected());
        }
    }
}
