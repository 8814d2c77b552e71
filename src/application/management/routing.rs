//! Smart order routing.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::{keep, no_venue, ExchangeManagementService};
use crate::domain::routing::{
    expected_slippage, select_best_price, select_deepest, select_highest_priority, split_amount,
    ChildOrder,
};
use crate::domain::{RoutingStrategy, SmartOrderRequest, SmartOrderResult};
use crate::error::{Error, Result};
use crate::port::ExchangeConnector;

/// Book levels fetched when ranking liquidity or estimating slippage.
const ROUTING_BOOK_DEPTH: usize = 100;

/// Decimal places kept when slicing a split order.
const SPLIT_SCALE: u32 = 8;

impl ExchangeManagementService {
    /// Route an order to one or more venues.
    ///
    /// An explicit preferred venue wins over the strategy. Single-venue
    /// routes propagate the venue's error; a split order succeeds as long as
    /// one slice does and reports only the slices that went through.
    pub async fn create_smart_order(&self, request: &SmartOrderRequest) -> Result<SmartOrderResult> {
        request.validate()?;
        let started = Instant::now();

        if let Some(venue) = request.preferred_venue {
            let connector = self.connector(venue)?;
            if !self.config(venue).map_or(true, |c| c.allows(&request.symbol)) {
                return Err(no_venue(&request.symbol));
            }
            let child = self.execute(&connector, request, request.amount).await?;
            return Ok(SmartOrderResult::summarize(
                request.strategy,
                vec![child],
                started.elapsed(),
            ));
        }

        let participants = self.participants(&request.symbol);
        if participants.is_empty() {
            return Err(no_venue(&request.symbol));
        }

        let children = match request.strategy {
            RoutingStrategy::SplitOrder => self.split(&participants, request).await?,
            strategy => {
                let connector = self.select(strategy, &participants, request).await?;
                vec![self.execute(&connector, request, request.amount).await?]
            }
        };

        let result = SmartOrderResult::summarize(request.strategy, children, started.elapsed());
        info!(
            symbol = %request.symbol,
            strategy = ?request.strategy,
            children = result.children.len(),
            filled = %result.total_amount,
            average_price = %result.average_price,
            "Smart order routed"
        );
        Ok(result)
    }

    async fn select(
        &self,
        strategy: RoutingStrategy,
        participants: &[Arc<dyn ExchangeConnector>],
        request: &SmartOrderRequest,
    ) -> Result<Arc<dyn ExchangeConnector>> {
        let venue = match strategy {
            RoutingStrategy::BestPrice => {
                let results =
                    join_all(participants.iter().map(|c| c.get_ticker(&request.symbol))).await;
                let tickers: Vec<_> = participants
                    .iter()
                    .zip(results)
                    .filter_map(|(c, r)| keep(c.as_ref(), r))
                    .collect();
                select_best_price(&tickers, request.side)
            }
            RoutingStrategy::LowestFee => {
                let candidates: Vec<_> = participants
                    .iter()
                    .map(|c| {
                        let priority = self.config(c.venue()).map_or(0, |cfg| cfg.priority);
                        (c.venue(), priority)
                    })
                    .collect();
                select_highest_priority(&candidates)
            }
            RoutingStrategy::HighestLiquidity => {
                let results = join_all(
                    participants
                        .iter()
                        .map(|c| c.get_order_book(&request.symbol, ROUTING_BOOK_DEPTH)),
                )
                .await;
                let books: Vec<_> = participants
                    .iter()
                    .zip(results)
                    .filter_map(|(c, r)| keep(c.as_ref(), r))
                    .collect();
                select_deepest(&books, request.side)
            }
            RoutingStrategy::SplitOrder => None,
        };

        let venue = venue.ok_or_else(|| no_venue(&request.symbol))?;
        debug!(venue = %venue, strategy = ?strategy, symbol = %request.symbol, "Venue selected");
        participants
            .iter()
            .find(|c| c.venue() == venue)
            .cloned()
            .ok_or(Error::NotConnected(venue))
    }

    /// Submit equal slices to every participant concurrently.
    async fn split(
        &self,
        participants: &[Arc<dyn ExchangeConnector>],
        request: &SmartOrderRequest,
    ) -> Result<Vec<ChildOrder>> {
        let slices = split_amount(request.amount, participants.len(), SPLIT_SCALE);
        let results = join_all(
            participants
                .iter()
                .zip(&slices)
                .map(|(c, amount)| self.execute(c, request, *amount)),
        )
        .await;

        let mut children = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (connector, result) in participants.iter().zip(results) {
            match result {
                Ok(child) => children.push(child),
                Err(e) => {
                    warn!(venue = %connector.venue(), symbol = %request.symbol, error = %e, "Split child failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match (children.is_empty(), first_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(children),
        }
    }

    /// Submit one order on one venue after the local pre-trade checks.
    async fn execute(
        &self,
        connector: &Arc<dyn ExchangeConnector>,
        request: &SmartOrderRequest,
        amount: Decimal,
    ) -> Result<ChildOrder> {
        let venue = connector.venue();
        if let Some(limit) = self.config(venue).and_then(|c| c.max_order_size) {
            if amount > limit {
                return Err(Error::OrderTooLarge { venue, amount, limit });
            }
        }

        if let (true, Some(limit)) = (request.is_market(), request.max_slippage) {
            let book = connector
                .get_order_book(&request.symbol, ROUTING_BOOK_DEPTH)
                .await?;
            // A book too thin to fill the amount counts as total slippage.
            let expected = expected_slippage(&book, request.side, amount).unwrap_or(Decimal::ONE);
            if expected > limit {
                return Err(Error::SlippageExceeded {
                    venue,
                    expected,
                    limit,
                });
            }
        }

        let order = connector.create_order(&request.child_request(amount)).await?;
        info!(
            venue = %venue,
            order_id = %order.id,
            symbol = %order.symbol,
            side = %order.side,
            amount = %amount,
            status = %order.status(),
            "Order submitted"
        );
        self.record(&order).await;
        Ok(ChildOrder::from_order(&order, amount))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::super::tests::service;
    use super::*;
    use crate::domain::{FeeSchedule, OrderStatus, Side, VenueId};
    use crate::error::VenueError;
    use crate::infrastructure::config::ExchangeConfig;
    use crate::port::OrderStore;
    use crate::testkit::connector::MockConnector;
    use crate::testkit::domain::{book, btc, ticker};

    fn buy(amount: Decimal) -> SmartOrderRequest {
        SmartOrderRequest::new(btc(), Side::Buy, amount)
    }

    // -------------------------------------------------------------------------
    // Strategy Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn best_price_buys_on_the_lowest_ask() {
        let (service, factory) = service(vec![
            MockConnector::new(VenueId::Binance).with_ticker(ticker(VenueId::Binance, btc(), dec!(99), dec!(101))),
            MockConnector::new(VenueId::Kraken).with_ticker(ticker(VenueId::Kraken, btc(), dec!(98), dec!(100))),
        ])
        .await;

        let result = service.create_smart_order(&buy(dec!(1))).await.unwrap();
        assert_eq!(result.children.len(), 1);
        assert_eq!(result.children[0].venue, VenueId::Kraken);
        assert_eq!(result.average_price, dec!(100));
        assert_eq!(factory.mock(VenueId::Binance).created_orders().len(), 0);
    }

    #[tokio::test]
    async fn best_price_ignores_venues_without_a_ticker() {
        let (service, _) = service(vec![
            MockConnector::new(VenueId::Binance).failing("get_ticker", VenueError::Timeout("slow".into())),
            MockConnector::new(VenueId::Coinbase).with_ticker(ticker(VenueId::Coinbase, btc(), dec!(99), dec!(103))),
        ])
        .await;

        let request = SmartOrderRequest::new(btc(), Side::Sell, dec!(1));
        let result = service.create_smart_order(&request).await.unwrap();
        assert_eq!(result.children[0].venue, VenueId::Coinbase);
    }

    #[tokio::test]
    async fn lowest_fee_uses_configured_priority() {
        let (service, _) = service(vec![
            MockConnector::new(VenueId::Binance).with_fill_price(dec!(100)),
            MockConnector::new(VenueId::Coinbase).with_fill_price(dec!(100)),
        ])
        .await;
        service
            .configure_exchange(ExchangeConfig::new(VenueId::Coinbase).with_priority(10))
            .await
            .unwrap();

        let request = buy(dec!(1)).with_strategy(RoutingStrategy::LowestFee);
        let result = service.create_smart_order(&request).await.unwrap();
        assert_eq!(result.children[0].venue, VenueId::Coinbase);
    }

    #[tokio::test]
    async fn highest_liquidity_picks_the_deepest_side() {
        let (service, _) = service(vec![
            MockConnector::new(VenueId::Binance)
                .with_fill_price(dec!(100))
                .with_book(book(VenueId::Binance, btc(), &[(dec!(99), dec!(50))], &[(dec!(100), dec!(1))])),
            MockConnector::new(VenueId::Kraken)
                .with_fill_price(dec!(100))
                .with_book(book(VenueId::Kraken, btc(), &[(dec!(99), dec!(1))], &[(dec!(100), dec!(8))])),
        ])
        .await;

        let request = buy(dec!(1)).with_strategy(RoutingStrategy::HighestLiquidity);
        let result = service.create_smart_order(&request).await.unwrap();
        assert_eq!(result.children[0].venue, VenueId::Kraken);
    }

    #[tokio::test]
    async fn split_order_slices_evenly_and_weights_the_average() {
        let (service, factory) = service(vec![
            MockConnector::new(VenueId::Binance)
                .with_fees(FeeSchedule::new(dec!(0.001), dec!(0.001)))
                .with_fill_price(dec!(100)),
            MockConnector::new(VenueId::Coinbase)
                .with_fees(FeeSchedule::new(dec!(0.001), dec!(0.002)))
                .with_fill_price(dec!(102)),
        ])
        .await;

        let request = buy(dec!(10)).with_strategy(RoutingStrategy::SplitOrder);
        let result = service.create_smart_order(&request).await.unwrap();

        assert_eq!(result.children.len(), 2);
        assert!(result.children.iter().all(|c| c.requested == dec!(5)));
        assert_eq!(result.total_amount, dec!(10));
        assert_eq!(result.average_price, dec!(101));
        // 5 * 100 * 0.001 + 5 * 102 * 0.002
        assert_eq!(result.total_fee, dec!(1.52));
        assert_eq!(factory.mock(VenueId::Binance).created_orders()[0].amount, dec!(5));
    }

    #[tokio::test]
    async fn split_order_survives_one_failed_slice() {
        let (service, _) = service(vec![
            MockConnector::new(VenueId::Binance).with_fill_price(dec!(100)),
            MockConnector::new(VenueId::Kraken)
                .failing("create_order", VenueError::rejected("insufficient balance")),
        ])
        .await;

        let request = buy(dec!(10)).with_strategy(RoutingStrategy::SplitOrder);
        let result = service.create_smart_order(&request).await.unwrap();
        assert_eq!(result.children.len(), 1);
        assert_eq!(result.total_amount, dec!(5));
        assert_eq!(result.average_price, dec!(100));
    }

    #[tokio::test]
    async fn split_order_fails_when_every_slice_fails() {
        let (service, _) = service(vec![
            MockConnector::new(VenueId::Binance).failing("create_order", VenueError::rejected("halted")),
            MockConnector::new(VenueId::Kraken).failing("create_order", VenueError::rejected("halted")),
        ])
        .await;

        let request = buy(dec!(2)).with_strategy(RoutingStrategy::SplitOrder);
        let err = service.create_smart_order(&request).await.unwrap_err();
        assert!(err.venue().is_some());
    }

    // -------------------------------------------------------------------------
    // Pre-trade Check Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn preferred_venue_overrides_strategy() {
        let (service, _) = service(vec![
            MockConnector::new(VenueId::Binance).with_ticker(ticker(VenueId::Binance, btc(), dec!(99), dec!(100))),
            MockConnector::new(VenueId::Kraken).with_ticker(ticker(VenueId::Kraken, btc(), dec!(99), dec!(105))),
        ])
        .await;

        let request = buy(dec!(1)).with_preferred_venue(VenueId::Kraken);
        let result = service.create_smart_order(&request).await.unwrap();
        assert_eq!(result.children[0].venue, VenueId::Kraken);
        assert_eq!(result.children[0].status, OrderStatus::Closed);
    }

    #[tokio::test]
    async fn preferred_venue_must_be_connected() {
        let (service, _) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let request = buy(dec!(1)).with_preferred_venue(VenueId::Coinbase);
        let err = service.create_smart_order(&request).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected(VenueId::Coinbase)));
    }

    #[tokio::test]
    async fn max_order_size_is_enforced_before_submission() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance).with_fill_price(dec!(1))]).await;
        service
            .configure_exchange(ExchangeConfig::new(VenueId::Binance).with_max_order_size(dec!(2)))
            .await
            .unwrap();

        let request = buy(dec!(3)).with_preferred_venue(VenueId::Binance);
        let err = service.create_smart_order(&request).await.unwrap_err();
        assert!(matches!(err, Error::OrderTooLarge { limit, .. } if limit == dec!(2)));
        assert_eq!(factory.mock(VenueId::Binance).calls("create_order"), 0);
    }

    #[tokio::test]
    async fn slippage_limit_rejects_thin_books() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance).with_book(book(
            VenueId::Binance,
            btc(),
            &[(dec!(99), dec!(5))],
            &[(dec!(100), dec!(1)), (dec!(110), dec!(1))],
        ))])
        .await;

        let request = buy(dec!(2))
            .with_preferred_venue(VenueId::Binance)
            .with_max_slippage(dec!(0.01));
        let err = service.create_smart_order(&request).await.unwrap_err();
        match err {
            Error::SlippageExceeded { expected, limit, .. } => {
                assert_eq!(expected, dec!(0.05));
                assert_eq!(limit, dec!(0.01));
            }
            other => panic!("expected slippage error, got {other:?}"),
        }
        assert_eq!(factory.mock(VenueId::Binance).calls("create_order"), 0);
    }

    #[tokio::test]
    async fn no_participant_means_no_venue() {
        let (service, _) = service(vec![]).await;
        let err = service.create_smart_order(&buy(dec!(1))).await.unwrap_err();
        assert!(matches!(err, Error::NoVenueAvailable { .. }));
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_a_venue() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let err = service.create_smart_order(&buy(dec!(0))).await.unwrap_err();
        assert!(matches!(err, Error::Domain(_)));
        assert_eq!(factory.mock(VenueId::Binance).calls("create_order"), 0);
    }

    #[tokio::test]
    async fn routed_orders_are_persisted() {
        let (service, _) = service(vec![MockConnector::new(VenueId::Binance).with_fill_price(dec!(100))]).await;
        let result = service.create_smart_order(&buy(dec!(1)).with_strategy(RoutingStrategy::LowestFee)).await.unwrap();

        let id = &result.children[0].order_id;
        let stored = service.store.get_order(VenueId::Binance, id).await.unwrap();
        assert!(stored.is_some());
        let connector = service.connector(VenueId::Binance).unwrap();
        assert_eq!(connector.venue(), VenueId::Binance);
    }
}
