//! Handler for the `watch` command.

use std::fmt::Display;

use serde::Serialize;
use tokio::signal;
use tracing::info;

use crate::adapter::inbound::cli::output;
use crate::application::ExchangeManagementService;
use crate::domain::{AggregatedOrderBook, AggregatedTicker, Symbol};
use crate::error::Result;
use crate::port::{StreamUpdate, Subscription};

/// Stream aggregates for `symbol` until Ctrl-C or the feed ends.
pub async fn execute(service: &ExchangeManagementService, symbol: &Symbol, book: bool) -> Result<()> {
    if book {
        let feed = service.subscribe_to_aggregated_order_book(symbol).await?;
        follow(feed, "book", describe_book).await;
    } else {
        let feed = service.subscribe_to_aggregated_ticker(symbol).await?;
        follow(feed, "ticker", describe_ticker).await;
    }
    Ok(())
}

async fn follow<A: Serialize>(mut feed: Subscription<A>, kind: &str, describe: fn(&A) -> String) {
    info!(topic = %feed.topic(), "Watching");
    loop {
        tokio::select! {
            update = feed.recv() => match update {
                Some(StreamUpdate::Event(aggregate)) => {
                    if !output::record(kind, &aggregate) {
                        output::line(describe(&aggregate));
                    }
                }
                Some(StreamUpdate::Failed(e)) => {
                    output::error(&format!("Feed failed: {e}"));
                    return;
                }
                None => {
                    output::warning("Feed closed");
                    return;
                }
            },
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                return;
            }
        }
    }
}

fn describe_ticker(ticker: &AggregatedTicker) -> String {
    format!(
        "{} bid {} ask {} spread {} ({} venues)",
        ticker.timestamp.format("%H:%M:%S%.3f"),
        quote(ticker.best_bid.map(|q| (q.price, q.venue))),
        quote(ticker.best_ask.map(|q| (q.price, q.venue))),
        output::or_dash(ticker.spread),
        ticker.venues.len(),
    )
}

fn describe_book(book: &AggregatedOrderBook) -> String {
    format!(
        "{} bid {} ask {} depth {}/{} ({} venues)",
        book.timestamp.format("%H:%M:%S%.3f"),
        quote(book.best_bid().map(|l| (l.price, l.venue))),
        quote(book.best_ask().map(|l| (l.price, l.venue))),
        book.total_bid_volume,
        book.total_ask_volume,
        book.venues.len(),
    )
}

fn quote<P: Display, V: Display>(best: Option<(P, V)>) -> String {
    best.map_or_else(|| "-".to_string(), |(price, venue)| format!("{price}@{venue}"))
}
