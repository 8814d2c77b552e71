//! Venuebridge - a multi-venue crypto trading gateway.
//!
//! One uniform [`ExchangeConnector`](port::ExchangeConnector) per venue
//! (Binance, Coinbase, Kraken) and an
//! [`ExchangeManagementService`](application::ExchangeManagementService)
//! that works across all of them: aggregated tickers, books and balances,
//! arbitrage scans, smart order routing and aggregated streams.
//!
//! # Modules
//!
//! - [`domain`] - Venue-agnostic types and the pure aggregation, routing and
//!   arbitrage calculations
//! - [`port`] - The connector trait, order store trait and stream types
//! - [`adapter`] - Venue connectors, an in-memory order store and the CLI
//! - [`application`] - The management service and connector helpers
//! - [`infrastructure`] - Configuration loading and logging setup
//! - [`error`] - Error types for the crate
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use venuebridge::adapter::outbound::memory::MemoryOrderStore;
//! use venuebridge::adapter::outbound::shared::ConnectorOptions;
//! use venuebridge::application::{ExchangeManagementService, VenueConnectorFactory};
//! use venuebridge::domain::Symbol;
//! use venuebridge::infrastructure::config::Settings;
//!
//! # async fn run() -> venuebridge::error::Result<()> {
//! let settings = Settings::load("config.toml")?;
//! let options = ConnectorOptions::new(settings.http.clone(), settings.stream.clone());
//! let service = ExchangeManagementService::from_settings(
//!     &settings,
//!     Arc::new(VenueConnectorFactory::new(options)),
//!     Arc::new(MemoryOrderStore::new()),
//! );
//! service.initialize().await;
//! let ticker = service.get_aggregated_ticker(&Symbol::new("BTCUSDT")).await?;
//! println!("{:?}", ticker.best_bid);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
