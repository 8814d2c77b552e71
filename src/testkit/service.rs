//! Management service wiring over [`MockConnector`]s.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adapter::outbound::memory::MemoryOrderStore;
use crate::application::{ConnectorFactory, ExchangeManagementService};
use crate::domain::VenueId;
use crate::error::{Error, Result, VenueError};
use crate::infrastructure::config::ExchangeConfig;
use crate::port::ExchangeConnector;
use crate::testkit::connector::MockConnector;

/// Factory handing out pre-built mocks by venue.
pub struct MockFactory {
    connectors: BTreeMap<VenueId, Arc<MockConnector>>,
}

impl MockFactory {
    pub fn new(mocks: Vec<MockConnector>) -> Self {
        Self {
            connectors: mocks.into_iter().map(|m| (m.venue(), Arc::new(m))).collect(),
        }
    }

    /// The mock serving `venue`. Panics when none was registered.
    pub fn mock(&self, venue: VenueId) -> Arc<MockConnector> {
        Arc::clone(&self.connectors[&venue])
    }
}

impl ConnectorFactory for MockFactory {
    fn create(&self, config: &ExchangeConfig) -> Result<Arc<dyn ExchangeConnector>> {
        let mock = self
            .connectors
            .get(&config.name)
            .ok_or_else(|| Error::exchange(config.name, VenueError::Unsupported("no mock".into())))?;
        Ok(Arc::clone(mock) as Arc<dyn ExchangeConnector>)
    }
}

/// Initialized service over `mocks`, each with its venue's default config.
pub async fn service(mocks: Vec<MockConnector>) -> (ExchangeManagementService, Arc<MockFactory>) {
    let configs = mocks.iter().map(|m| ExchangeConfig::new(m.venue())).collect();
    service_with(configs, mocks).await
}

/// Initialized service over `mocks` with explicit venue configs.
pub async fn service_with(
    configs: Vec<ExchangeConfig>,
    mocks: Vec<MockConnector>,
) -> (ExchangeManagementService, Arc<MockFactory>) {
    let factory = Arc::new(MockFactory::new(mocks));
    let service = ExchangeManagementService::new(
        configs,
        Arc::clone(&factory) as Arc<dyn ConnectorFactory>,
        Arc::new(MemoryOrderStore::new()),
    );
    service.initialize().await;
    (service, factory)
}
