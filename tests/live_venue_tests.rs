//! Integration tests against the live venue APIs.
//!
//! These tests need network access. Balance tests also need credentials.
//!
//! # Running Integration Tests
//!
//! Integration tests are gated behind the `integration-tests` feature flag
//! and are marked with `#[ignore]` to prevent accidental execution.
//!
//! ```bash
//! cargo test --features integration-tests -- --ignored
//! ```
//!
//! Credentials for the authenticated tests are read the same way the binary
//! reads them, for example `BINANCE_API_KEY` and `BINANCE_API_SECRET`. Tests
//! for venues without credentials skip themselves.
//!
//! Nothing here places orders.

#![cfg(feature = "integration-tests")]

use std::sync::Arc;
use std::time::Duration;

use venuebridge::adapter::outbound::shared::ConnectorOptions;
use venuebridge::application::{ConnectorFactory, VenueConnectorFactory};
use venuebridge::domain::{Symbol, VenueId};
use venuebridge::infrastructure::config::{Credentials, ExchangeConfig};
use venuebridge::port::{ExchangeConnector, StreamUpdate};

const TIMEOUT: Duration = Duration::from_secs(30);

fn connector(config: ExchangeConfig) -> Arc<dyn ExchangeConnector> {
    VenueConnectorFactory::new(ConnectorOptions::default())
        .create(&config)
        .expect("create connector")
}

fn public(venue: VenueId) -> Arc<dyn ExchangeConnector> {
    connector(ExchangeConfig::new(venue))
}

fn authenticated(venue: VenueId) -> Option<Arc<dyn ExchangeConnector>> {
    let _ = dotenvy::dotenv();
    match Credentials::from_lookup(venue, |name| std::env::var(name).ok()) {
        Some(credentials) => Some(connector(ExchangeConfig::new(venue).with_credentials(credentials))),
        None => {
            eprintln!("Skipping {venue}: no credentials in environment");
            None
        }
    }
}

fn symbol(venue: VenueId) -> Symbol {
    match venue {
        VenueId::Binance => Symbol::new("BTCUSDT"),
        VenueId::Coinbase | VenueId::Kraken => Symbol::new("BTCUSD"),
    }
}

async fn check_public_market_data(venue: VenueId) {
    let connector = public(venue);
    tokio::time::timeout(TIMEOUT, connector.connect())
        .await
        .expect("connect timed out")
        .expect("connect");

    let symbol = symbol(venue);
    let ticker = tokio::time::timeout(TIMEOUT, connector.get_ticker(&symbol))
        .await
        .expect("ticker timed out")
        .expect("ticker");
    assert_eq!(ticker.symbol, symbol);
    assert!(ticker.bid <= ticker.ask, "{venue} ticker crossed: {ticker:?}");

    let book = tokio::time::timeout(TIMEOUT, connector.get_order_book(&symbol, 10))
        .await
        .expect("book timed out")
        .expect("book");
    assert!(!book.bids.is_empty() && !book.asks.is_empty());
    assert!(book.bids.windows(2).all(|w| w[0].price >= w[1].price));
    assert!(book.asks.windows(2).all(|w| w[0].price <= w[1].price));

    connector.disconnect().await.expect("disconnect");
}

async fn check_ticker_stream(venue: VenueId) {
    let connector = public(venue);
    connector.connect().await.expect("connect");

    let symbol = symbol(venue);
    let mut subscription = connector.subscribe_to_ticker(&symbol).await.expect("subscribe");
    let update = tokio::time::timeout(TIMEOUT, subscription.recv())
        .await
        .expect("no ticker update in time")
        .expect("stream closed");
    match update {
        StreamUpdate::Event(ticker) => assert_eq!(ticker.symbol, symbol),
        StreamUpdate::Failed(e) => panic!("{venue} stream failed: {e}"),
    }

    connector.disconnect().await.expect("disconnect");
}

async fn check_balances(venue: VenueId) {
    let Some(connector) = authenticated(venue) else {
        return;
    };
    connector.connect().await.expect("connect");
    let balances = tokio::time::timeout(TIMEOUT, connector.get_balances())
        .await
        .expect("balances timed out")
        .expect("balances");
    assert!(balances.iter().all(|b| b.total >= b.free));
    connector.disconnect().await.expect("disconnect");
}

// ============================================================================
// Binance
// ============================================================================

mod binance {
    use super::*;

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_public_market_data() {
        check_public_market_data(VenueId::Binance).await;
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_ticker_stream() {
        check_ticker_stream(VenueId::Binance).await;
    }

    #[tokio::test]
    #[ignore = "requires BINANCE_API_KEY and network access"]
    async fn test_balances() {
        check_balances(VenueId::Binance).await;
    }
}

// ============================================================================
// Coinbase
// ============================================================================

mod coinbase {
    use super::*;

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_public_market_data() {
        check_public_market_data(VenueId::Coinbase).await;
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_ticker_stream() {
        check_ticker_stream(VenueId::Coinbase).await;
    }

    #[tokio::test]
    #[ignore = "requires COINBASE_API_KEY and network access"]
    async fn test_balances() {
        check_balances(VenueId::Coinbase).await;
    }
}

// ============================================================================
// Kraken
// ============================================================================

mod kraken {
    use super::*;

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_public_market_data() {
        check_public_market_data(VenueId::Kraken).await;
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_ticker_stream() {
        check_ticker_stream(VenueId::Kraken).await;
    }

    #[tokio::test]
    #[ignore = "requires KRAKEN_API_KEY and network access"]
    async fn test_balances() {
        check_balances(VenueId::Kraken).await;
    }
}
