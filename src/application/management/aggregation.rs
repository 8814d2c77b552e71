//! Cross-venue aggregation and arbitrage scanning.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use super::{keep, no_venue, ExchangeManagementService};
use crate::domain::aggregate::{aggregate_balances, aggregate_order_books, aggregate_tickers};
use crate::domain::arbitrage::{evaluate_opportunity, find_crossed, rank_opportunities};
use crate::domain::{
    AggregatedOrderBook, AggregatedTicker, ArbitrageOpportunity, OrderBook, PortfolioBalance,
    Symbol, Ticker,
};
use crate::error::Result;
use crate::port::ExchangeConnector;

/// Levels requested per venue when no limit is given.
const DEFAULT_BOOK_DEPTH: usize = 20;

impl ExchangeManagementService {
    /// Balances of every connected venue merged by asset.
    ///
    /// A venue whose balances cannot be fetched is logged and left out.
    pub async fn get_portfolio_balances(&self) -> Vec<PortfolioBalance> {
        let connectors = self.connected();
        let results = join_all(connectors.iter().map(|c| c.get_balances())).await;
        let balances: Vec<_> = connectors
            .iter()
            .zip(results)
            .filter_map(|(c, r)| keep(c.as_ref(), r))
            .flatten()
            .collect();
        aggregate_balances(&balances)
    }

    /// Best bid and ask across venues for `symbol`.
    pub async fn get_aggregated_ticker(&self, symbol: &Symbol) -> Result<AggregatedTicker> {
        let tickers = fetch_tickers(&self.participants(symbol), symbol).await;
        aggregate_tickers(symbol, &tickers).ok_or_else(|| no_venue(symbol))
    }

    /// Every venue's book for `symbol` merged into one, levels tagged by venue.
    ///
    /// `limit` bounds the levels requested from each venue.
    pub async fn get_aggregated_order_book(
        &self,
        symbol: &Symbol,
        limit: Option<usize>,
    ) -> Result<AggregatedOrderBook> {
        let depth = limit.unwrap_or(DEFAULT_BOOK_DEPTH);
        let books = fetch_books(&self.participants(symbol), symbol, depth).await;
        aggregate_order_books(symbol, &books).ok_or_else(|| no_venue(symbol))
    }

    /// Scan `symbols` for cross-venue spreads, largest spread percent first.
    ///
    /// Symbols are scanned concurrently; a symbol that cannot be evaluated
    /// simply yields nothing.
    pub async fn detect_arbitrage_opportunities(&self, symbols: &[Symbol]) -> Vec<ArbitrageOpportunity> {
        let scans = join_all(symbols.iter().map(|s| self.scan(s))).await;
        let mut opportunities: Vec<_> = scans.into_iter().flatten().collect();
        rank_opportunities(&mut opportunities);
        opportunities
    }

    async fn scan(&self, symbol: &Symbol) -> Option<ArbitrageOpportunity> {
        let participants = self.participants(symbol);
        let tickers = fetch_tickers(&participants, symbol).await;
        let quotes = find_crossed(&tickers, self.arbitrage.min_spread_pct)?;

        let find = |venue| participants.iter().find(|c| c.venue() == venue);
        let (buyer, seller) = (find(quotes.buy_venue)?, find(quotes.sell_venue)?);
        let depth = self.arbitrage.book_depth;
        let (buy_book, sell_book) = tokio::join!(
            buyer.get_order_book(symbol, depth),
            seller.get_order_book(symbol, depth)
        );
        let buy_book = keep(buyer.as_ref(), buy_book)?;
        let sell_book = keep(seller.as_ref(), sell_book)?;

        let opportunity = evaluate_opportunity(
            symbol,
            quotes,
            &buy_book,
            &sell_book,
            buyer.fees(),
            seller.fees(),
            &self.arbitrage,
        )?;
        debug!(
            symbol = %symbol,
            buy_venue = %opportunity.buy_venue,
            sell_venue = %opportunity.sell_venue,
            spread_pct = %opportunity.spread_pct,
            max_volume = %opportunity.max_volume,
            "Arbitrage opportunity"
        );
        Some(opportunity)
    }
}

async fn fetch_tickers(connectors: &[Arc<dyn ExchangeConnector>], symbol: &Symbol) -> Vec<Ticker> {
    let results = join_all(connectors.iter().map(|c| c.get_ticker(symbol))).await;
    connectors
        .iter()
        .zip(results)
        .filter_map(|(c, r)| keep(c.as_ref(), r))
        .collect()
}

async fn fetch_books(
    connectors: &[Arc<dyn ExchangeConnector>],
    symbol: &Symbol,
    depth: usize,
) -> Vec<OrderBook> {
    let results = join_all(connectors.iter().map(|c| c.get_order_book(symbol, depth))).await;
    connectors
        .iter()
        .zip(results)
        .filter_map(|(c, r)| keep(c.as_ref(), r))
        .collect()
}
