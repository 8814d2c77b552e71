//! Operations composed from a single connector's primitives.
//!
//! These work against any [`ExchangeConnector`], so every venue gets them
//! without per-adapter code.

use futures_util::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::{Order, OrderId, OrderStatus, Symbol};
use crate::error::{Error, Result};
use crate::port::{ExchangeConnector, OrderQuery};

/// Total value of a venue's balances in `quote`.
///
/// Balances already in `quote` count at face value; other assets are valued
/// at the venue's last price for `{asset}{quote}`. Assets the venue cannot
/// price are skipped with a warning.
pub async fn portfolio_value(connector: &dyn ExchangeConnector, quote: &str) -> Result<Decimal> {
    let quote = quote.to_ascii_uppercase();
    let balances = connector.get_balances().await?;

    let mut total = Decimal::ZERO;
    for balance in balances.iter().filter(|b| !b.is_empty()) {
        if balance.asset.eq_ignore_ascii_case(&quote) {
            total += balance.total;
            continue;
        }
        let symbol = Symbol::from_assets(&balance.asset, &quote);
        match connector.get_ticker(&symbol).await {
            Ok(ticker) => total += balance.total * ticker.last,
            Err(e) => {
                warn!(
                    venue = %connector.venue(),
                    asset = %balance.asset,
                    error = %e,
                    "Skipping asset without a price"
                );
            }
        }
    }
    Ok(total)
}

/// Outcome of [`cancel_all_orders`].
#[derive(Debug, Default)]
pub struct CancelAllReport {
    pub canceled: Vec<Order>,
    pub failed: Vec<(OrderId, Error)>,
}

impl CancelAllReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Cancel every open order, optionally for one symbol only.
///
/// Cancels are issued concurrently. A failed cancel is reported, not raised;
/// only failing to list the open orders is an error.
pub async fn cancel_all_orders(
    connector: &dyn ExchangeConnector,
    symbol: Option<&Symbol>,
) -> Result<CancelAllReport> {
    let open = connector.get_open_orders(symbol).await?;
    debug!(venue = %connector.venue(), count = open.len(), "Canceling open orders");

    let results = join_all(
        open.iter()
            .map(|order| connector.cancel_order(&order.id, &order.symbol)),
    )
    .await;

    let mut report = CancelAllReport::default();
    for (order, result) in open.into_iter().zip(results) {
        match result {
            Ok(canceled) => report.canceled.push(canceled),
            Err(e) => {
                warn!(venue = %connector.venue(), order_id = %order.id, error = %e, "Cancel failed");
                report.failed.push((order.id, e));
            }
        }
    }
    Ok(report)
}

/// Order history filtered to `statuses`; an empty filter keeps everything.
pub async fn order_history(
    connector: &dyn ExchangeConnector,
    query: &OrderQuery,
    statuses: &[OrderStatus],
) -> Result<Vec<Order>> {
    let orders = connector.get_orders(query).await?;
    Ok(orders
        .into_iter()
        .filter(|o| statuses.is_empty() || statuses.contains(&o.status()))
        .collect())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{OrderRequest, Side, VenueId};
    use crate::error::VenueError;
    use crate::testkit::connector::MockConnector;
    use crate::testkit::domain::{balance, btc, ticker};

    // -------------------------------------------------------------------------
    // Portfolio Value Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn values_assets_through_venue_tickers() {
        let mock = MockConnector::new(VenueId::Binance)
            .with_balance(balance(VenueId::Binance, "USDT", dec!(250)))
            .with_balance(balance(VenueId::Binance, "BTC", dec!(2)))
            .with_ticker(ticker(VenueId::Binance, btc(), dec!(99), dec!(101)));

        let value = portfolio_value(&mock, "usdt").await.unwrap();
        assert_eq!(value, dec!(450));
    }

    #[tokio::test]
    async fn unpriced_assets_are_skipped() {
        let mock = MockConnector::new(VenueId::Kraken)
            .with_balance(balance(VenueId::Kraken, "USDT", dec!(10)))
            .with_balance(balance(VenueId::Kraken, "DOGE", dec!(1000)));

        assert_eq!(portfolio_value(&mock, "USDT").await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn balance_failure_propagates() {
        let mock = MockConnector::new(VenueId::Coinbase)
            .failing("get_balances", VenueError::Authentication("bad key".into()));
        let err = portfolio_value(&mock, "USD").await.unwrap_err();
        assert_eq!(err.venue(), Some(VenueId::Coinbase));
    }

    // -------------------------------------------------------------------------
    // Cancel All Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn cancels_every_open_order() {
        let mock = MockConnector::new(VenueId::Binance).resting();
        for _ in 0..3 {
            mock.create_order(&OrderRequest::limit(btc(), Side::Buy, dec!(1), dec!(90)))
                .await
                .unwrap();
        }

        let report = cancel_all_orders(&mock, Some(&btc())).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.canceled.len(), 3);
        assert!(report
            .canceled
            .iter()
            .all(|o| o.status() == OrderStatus::Canceled));
        assert!(mock.get_open_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_cancels_are_reported() {
        let mock = MockConnector::new(VenueId::Binance)
            .resting()
            .failing("cancel_order", VenueError::rejected("locked"));
        mock.create_order(&OrderRequest::limit(btc(), Side::Sell, dec!(1), dec!(110)))
            .await
            .unwrap();

        let report = cancel_all_orders(&mock, None).await.unwrap();
        assert!(report.canceled.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_complete());
    }

    // -------------------------------------------------------------------------
    // History Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn history_filters_by_status() {
        let mock = MockConnector::new(VenueId::Binance)
            .with_ticker(ticker(VenueId::Binance, btc(), dec!(99), dec!(100)));
        let filled = mock
            .create_order(&OrderRequest::market(btc(), Side::Buy, dec!(1)))
            .await
            .unwrap();

        let query = OrderQuery::for_symbol(btc());
        let closed = order_history(&mock, &query, &[OrderStatus::Closed]).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, filled.id);

        let open = order_history(&mock, &query, &[OrderStatus::Open]).await.unwrap();
        assert!(open.is_empty());
        assert_eq!(order_history(&mock, &query, &[]).await.unwrap().len(), 1);
    }
}
