//! Aggregated streaming feeds.
//!
//! One feed task per aggregate kind and symbol. The first subscriber starts
//! it by subscribing the symbol on every participating venue; later
//! subscribers attach to the running feed. Each venue update replaces that
//! venue's latest snapshot, the aggregate is recomputed and offered to every
//! subscriber without blocking.
//!
//! ```text
//! venue A --\
//! venue B ----> select_all --> latest per venue --> aggregate --> sinks
//! venue C --/
//! ```
//!
//! A feed ends when its last subscriber is gone or when every venue stream
//! has ended. In the second case subscribers receive the last venue failure.
//!
//! Starting a feed is serialised per topic, so concurrent first subscribers
//! share one feed.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use futures_util::stream::{select_all, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{no_venue, ExchangeManagementService};
use crate::domain::aggregate::{aggregate_order_books, aggregate_tickers};
use crate::domain::{AggregatedOrderBook, AggregatedTicker, Symbol, VenueId};
use crate::error::{Result, VenueError};
use crate::port::stream::{offer_event, offer_failure, Delivery};
use crate::port::{Channel, ExchangeConnector, StreamUpdate, Subscription, Topic};

type Aggregator<E, A> = fn(&Symbol, &[E]) -> Option<A>;
type Feeds<A> = Arc<DashMap<Symbol, Feed<A>>>;

struct Sinks<A> {
    senders: Vec<mpsc::Sender<StreamUpdate<A>>>,
    /// Set by the feed task when it stops; no sender may be added after.
    closed: bool,
}

struct Feed<A> {
    sinks: Arc<Mutex<Sinks<A>>>,
    task: JoinHandle<()>,
}

/// Running aggregated feeds, by kind and symbol.
#[derive(Default)]
pub(super) struct StreamRegistry {
    tickers: Feeds<AggregatedTicker>,
    books: Feeds<AggregatedOrderBook>,
    /// Held while a feed for the topic is being started.
    starting: DashMap<Topic, Arc<tokio::sync::Mutex<()>>>,
}

impl StreamRegistry {
    /// Abort every feed; subscribers see their stream end.
    pub(super) fn shutdown(&self) {
        for feed in self.tickers.iter() {
            feed.task.abort();
        }
        for feed in self.books.iter() {
            feed.task.abort();
        }
        self.tickers.clear();
        self.books.clear();
    }
}

impl ExchangeManagementService {
    /// Subscribe to the cross-venue ticker for `symbol`.
    pub async fn subscribe_to_aggregated_ticker(
        &self,
        symbol: &Symbol,
    ) -> Result<Subscription<AggregatedTicker>> {
        self.subscribe_aggregate(
            symbol,
            Channel::Ticker,
            &self.streams.tickers,
            |connector, symbol| async move { connector.subscribe_to_ticker(&symbol).await },
            aggregate_tickers,
        )
        .await
    }

    /// Subscribe to the merged order book for `symbol`.
    pub async fn subscribe_to_aggregated_order_book(
        &self,
        symbol: &Symbol,
    ) -> Result<Subscription<AggregatedOrderBook>> {
        self.subscribe_aggregate(
            symbol,
            Channel::OrderBook,
            &self.streams.books,
            |connector, symbol| async move { connector.subscribe_to_order_book(&symbol).await },
            aggregate_order_books,
        )
        .await
    }

    /// Live aggregated feeds, tickers and books together.
    #[must_use]
    pub fn active_feeds(&self) -> usize {
        self.streams.tickers.len() + self.streams.books.len()
    }

    async fn subscribe_aggregate<E, A, F, Fut>(
        &self,
        symbol: &Symbol,
        channel: Channel,
        feeds: &Feeds<A>,
        subscribe: F,
        aggregate: Aggregator<E, A>,
    ) -> Result<Subscription<A>>
    where
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
        F: Fn(Arc<dyn ExchangeConnector>, Symbol) -> Fut,
        Fut: Future<Output = Result<Subscription<E>>>,
    {
        let topic = Topic::symbol(channel, symbol.clone());
        let (tx, subscription) = Subscription::channel(topic.clone(), self.stream_capacity);

        let Err(tx) = attach(feeds, symbol, tx) else {
            debug!(symbol = %symbol, channel = %channel, "Attached to running feed");
            return Ok(subscription);
        };

        let gate = Arc::clone(self.streams.starting.entry(topic.clone()).or_default().value());
        let started = {
            let _starting = gate.lock().await;
            match attach(feeds, symbol, tx) {
                Ok(()) => {
                    debug!(symbol = %symbol, channel = %channel, "Attached to feed started meanwhile");
                    Ok(())
                }
                Err(tx) => self.start_feed(symbol, channel, feeds, tx, subscribe, aggregate).await,
            }
        };
        drop(gate);
        self.streams
            .starting
            .remove_if(&topic, |_, gate| Arc::strong_count(gate) == 1);

        started.map(|()| subscription)
    }

    async fn start_feed<E, A, F, Fut>(
        &self,
        symbol: &Symbol,
        channel: Channel,
        feeds: &Feeds<A>,
        tx: mpsc::Sender<StreamUpdate<A>>,
        subscribe: F,
        aggregate: Aggregator<E, A>,
    ) -> Result<()>
    where
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
        F: Fn(Arc<dyn ExchangeConnector>, Symbol) -> Fut,
        Fut: Future<Output = Result<Subscription<E>>>,
    {
        let participants = self.participants(symbol);
        if participants.is_empty() {
            return Err(no_venue(symbol));
        }
        let results = join_all(
            participants
                .iter()
                .map(|c| subscribe(Arc::clone(c), symbol.clone())),
        )
        .await;

        let mut venues = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (connector, result) in participants.iter().zip(results) {
            match result {
                Ok(venue_subscription) => venues.push((connector.venue(), venue_subscription)),
                Err(e) => {
                    warn!(venue = %connector.venue(), symbol = %symbol, error = %e, "Venue left out of feed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if venues.is_empty() {
            return Err(first_error.unwrap_or_else(|| no_venue(symbol)));
        }

        let sinks = Arc::new(Mutex::new(Sinks {
            senders: vec![tx],
            closed: false,
        }));
        info!(symbol = %symbol, channel = %channel, venues = venues.len(), "Aggregated feed started");
        let task = tokio::spawn(run_feed(
            symbol.clone(),
            venues,
            Arc::clone(&sinks),
            Arc::clone(feeds),
            aggregate,
        ));
        feeds.insert(symbol.clone(), Feed { sinks, task });
        Ok(())
    }
}

/// Join the running feed for `symbol`, or hand `tx` back if there is none.
fn attach<A>(
    feeds: &Feeds<A>,
    symbol: &Symbol,
    tx: mpsc::Sender<StreamUpdate<A>>,
) -> std::result::Result<(), mpsc::Sender<StreamUpdate<A>>> {
    let Some(sinks) = feeds.get(symbol).map(|feed| Arc::clone(&feed.sinks)) else {
        return Err(tx);
    };
    let mut guard = sinks.lock();
    if guard.closed {
        return Err(tx);
    }
    guard.senders.push(tx);
    Ok(())
}

async fn run_feed<E, A>(
    symbol: Symbol,
    venues: Vec<(VenueId, Subscription<E>)>,
    sinks: Arc<Mutex<Sinks<A>>>,
    feeds: Feeds<A>,
    aggregate: Aggregator<E, A>,
) where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    let mut merged = select_all(
        venues
            .into_iter()
            .map(|(venue, subscription)| subscription.map(move |update| (venue, update))),
    );
    let mut latest: BTreeMap<VenueId, E> = BTreeMap::new();
    let mut last_failure: Option<VenueError> = None;

    let subscribed = loop {
        let Some((venue, update)) = merged.next().await else {
            break true;
        };
        match update {
            StreamUpdate::Event(event) => {
                latest.insert(venue, event);
                let snapshot: Vec<E> = latest.values().cloned().collect();
                let Some(aggregated) = aggregate(&symbol, &snapshot) else {
                    continue;
                };
                if !broadcast(&sinks, &symbol, aggregated) {
                    break false;
                }
            }
            StreamUpdate::Failed(e) => {
                warn!(venue = %venue, symbol = %symbol, error = %e, "Venue stream failed, dropped from feed");
                latest.remove(&venue);
                last_failure = Some(e);
            }
        }
    };

    if subscribed {
        let failure = last_failure.unwrap_or(VenueError::StreamUnavailable {
            channel: symbol.to_string(),
            reason: "every venue stream ended".into(),
        });
        error!(symbol = %symbol, error = %failure, "Aggregated feed lost all venues");
        let mut guard = sinks.lock();
        for tx in guard.senders.drain(..) {
            offer_failure(&tx, failure.clone());
        }
        guard.closed = true;
        drop(guard);
    } else {
        info!(symbol = %symbol, "Aggregated feed has no subscribers, stopping");
    }

    feeds.remove_if(&symbol, |_, feed| Arc::ptr_eq(&feed.sinks, &sinks));
}

/// Offer `aggregated` to every sink. Returns `false`, and closes the feed, once
/// no sink remains.
fn broadcast<A: Clone>(sinks: &Mutex<Sinks<A>>, symbol: &Symbol, aggregated: A) -> bool {
    let mut guard = sinks.lock();
    guard.senders.retain(|tx| match offer_event(tx, aggregated.clone()) {
        Delivery::Delivered | Delivery::Ignored => true,
        Delivery::Lagging => {
            warn!(symbol = %symbol, "Aggregate subscriber lagging, update dropped");
            true
        }
        Delivery::Closed => false,
    });
    if guard.senders.is_empty() {
        guard.closed = true;
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;
    use tokio::time::timeout;

    use super::super::tests::service;
    use super::*;
    use crate::error::Error;
    use crate::testkit::connector::MockConnector;
    use crate::testkit::domain::{book, btc, ticker};

    async fn next<A>(subscription: &mut Subscription<A>) -> StreamUpdate<A> {
        match timeout(Duration::from_secs(5), subscription.recv()).await {
            Ok(Some(update)) => update,
            Ok(None) => panic!("subscription closed"),
            Err(_) => panic!("timed out waiting for update"),
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn venue_updates_are_recomputed_into_the_aggregate() {
        let (service, factory) = service(vec![
            MockConnector::new(VenueId::Binance),
            MockConnector::new(VenueId::Kraken),
        ])
        .await;
        let mut feed = service.subscribe_to_aggregated_ticker(&btc()).await.unwrap();

        factory
            .mock(VenueId::Binance)
            .push_ticker(ticker(VenueId::Binance, btc(), dec!(99), dec!(101)));
        let first = next(&mut feed).await.into_event().unwrap();
        assert_eq!(first.venues.len(), 1);

        factory
            .mock(VenueId::Kraken)
            .push_ticker(ticker(VenueId::Kraken, btc(), dec!(100), dec!(102)));
        let second = next(&mut feed).await.into_event().unwrap();
        assert_eq!(second.venues.len(), 2);
        assert_eq!(second.best_bid.unwrap().venue, VenueId::Kraken);
        assert_eq!(second.best_ask.unwrap().venue, VenueId::Binance);
    }

    #[tokio::test]
    async fn venues_are_subscribed_once_per_symbol() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let mut a = service.subscribe_to_aggregated_ticker(&btc()).await.unwrap();
        let mut b = service.subscribe_to_aggregated_ticker(&btc()).await.unwrap();

        let mock = factory.mock(VenueId::Binance);
        assert_eq!(mock.calls("subscribe_to_ticker"), 1);
        assert_eq!(service.active_feeds(), 1);

        mock.push_ticker(ticker(VenueId::Binance, btc(), dec!(1), dec!(2)));
        assert!(next(&mut a).await.into_event().is_some());
        assert!(next(&mut b).await.into_event().is_some());
    }

    #[tokio::test]
    async fn order_book_feed_merges_levels() {
        let (service, factory) = service(vec![
            MockConnector::new(VenueId::Binance),
            MockConnector::new(VenueId::Coinbase),
        ])
        .await;
        let mut feed = service.subscribe_to_aggregated_order_book(&btc()).await.unwrap();

        factory.mock(VenueId::Binance).push_book(book(
            VenueId::Binance,
            btc(),
            &[(dec!(99), dec!(1))],
            &[(dec!(101), dec!(1))],
        ));
        let _ = next(&mut feed).await;
        factory.mock(VenueId::Coinbase).push_book(book(
            VenueId::Coinbase,
            btc(),
            &[(dec!(100), dec!(2))],
            &[(dec!(102), dec!(2))],
        ));
        let merged = next(&mut feed).await.into_event().unwrap();
        assert_eq!(merged.bids[0].venue, VenueId::Coinbase);
        assert_eq!(merged.asks[0].venue, VenueId::Binance);
        assert_eq!(merged.total_bid_volume, dec!(3));
    }

    #[tokio::test]
    async fn feed_stops_when_subscribers_leave() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let feed = service.subscribe_to_aggregated_ticker(&btc()).await.unwrap();
        drop(feed);

        let mock = factory.mock(VenueId::Binance);
        mock.push_ticker(ticker(VenueId::Binance, btc(), dec!(1), dec!(2)));
        wait_until(|| service.active_feeds() == 0).await;
        wait_until(|| mock.ticker_subscribers() == 0).await;

        // A new subscriber starts a fresh feed.
        let _again = service.subscribe_to_aggregated_ticker(&btc()).await.unwrap();
        assert_eq!(mock.calls("subscribe_to_ticker"), 2);
    }

    #[tokio::test]
    async fn one_failed_venue_leaves_the_rest_streaming() {
        let (service, factory) = service(vec![
            MockConnector::new(VenueId::Binance),
            MockConnector::new(VenueId::Kraken),
        ])
        .await;
        let mut feed = service.subscribe_to_aggregated_ticker(&btc()).await.unwrap();

        factory
            .mock(VenueId::Kraken)
            .fail_streams(VenueError::StreamUnavailable {
                channel: "ticker".into(),
                reason: "gave up".into(),
            });
        factory
            .mock(VenueId::Binance)
            .push_ticker(ticker(VenueId::Binance, btc(), dec!(1), dec!(2)));

        let update = next(&mut feed).await.into_event().unwrap();
        assert_eq!(update.venues.keys().copied().collect::<Vec<_>>(), vec![VenueId::Binance]);
    }

    #[tokio::test]
    async fn losing_every_venue_fails_the_feed_once() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let mut feed = service.subscribe_to_aggregated_ticker(&btc()).await.unwrap();

        let reason = VenueError::StreamUnavailable {
            channel: "ticker".into(),
            reason: "gave up".into(),
        };
        factory.mock(VenueId::Binance).fail_streams(reason.clone());

        match next(&mut feed).await {
            StreamUpdate::Failed(e) => assert_eq!(e, reason),
            StreamUpdate::Event(_) => panic!("expected failure"),
        }
        assert!(timeout(Duration::from_secs(5), feed.recv()).await.unwrap().is_none());
        wait_until(|| service.active_feeds() == 0).await;
    }

    #[tokio::test]
    async fn terminal_failure_reaches_a_subscriber_that_stopped_reading() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let service = service.with_stream_capacity(2);
        let mut feed = service.subscribe_to_aggregated_ticker(&btc()).await.unwrap();

        let mock = factory.mock(VenueId::Binance);
        for bid in [dec!(1), dec!(2), dec!(3), dec!(4)] {
            mock.push_ticker(ticker(VenueId::Binance, btc(), bid, bid + dec!(10)));
        }
        let reason = VenueError::StreamUnavailable {
            channel: "ticker".into(),
            reason: "gave up".into(),
        };
        mock.fail_streams(reason.clone());
        wait_until(|| service.active_feeds() == 0).await;

        let mut events = 0;
        loop {
            match next(&mut feed).await {
                StreamUpdate::Event(_) => events += 1,
                StreamUpdate::Failed(e) => {
                    assert_eq!(e, reason);
                    break;
                }
            }
        }
        assert_eq!(events, 2);
        assert!(feed.recv().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_subscribers_share_one_feed() {
        let (service, factory) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.subscribe_to_aggregated_ticker(&btc()).await })
            })
            .collect();
        let mut feeds = Vec::new();
        for handle in handles {
            feeds.push(handle.await.unwrap().unwrap());
        }

        let mock = factory.mock(VenueId::Binance);
        assert_eq!(mock.calls("subscribe_to_ticker"), 1);
        assert_eq!(service.active_feeds(), 1);
        assert!(service.streams.starting.is_empty());

        mock.push_ticker(ticker(VenueId::Binance, btc(), dec!(1), dec!(2)));
        for feed in &mut feeds {
            assert!(next(feed).await.into_event().is_some());
        }
    }

    #[tokio::test]
    async fn subscribe_fails_when_no_venue_can_stream() {
        let (unsupported, _) = service(vec![MockConnector::new(VenueId::Binance)
            .failing("subscribe_to_ticker", VenueError::Unsupported("ticker".into()))])
        .await;
        let err = unsupported.subscribe_to_aggregated_ticker(&btc()).await.unwrap_err();
        assert_eq!(err.venue(), Some(VenueId::Binance));

        let (empty, _) = service(Vec::new()).await;
        assert!(matches!(
            empty.subscribe_to_aggregated_ticker(&btc()).await,
            Err(Error::NoVenueAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn disconnect_ends_every_feed() {
        let (service, _) = service(vec![MockConnector::new(VenueId::Binance)]).await;
        let mut feed = service.subscribe_to_aggregated_ticker(&btc()).await.unwrap();
        service.disconnect().await;

        assert!(timeout(Duration::from_secs(5), feed.recv()).await.unwrap().is_none());
        assert_eq!(service.active_feeds(), 0);
    }
}
