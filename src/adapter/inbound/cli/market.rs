//! Handlers for the market-data commands: `ticker`, `book`, `balances`,
//! `arbitrage`.

use crate::adapter::inbound::cli::output;
use crate::application::ExchangeManagementService;
use crate::domain::Symbol;
use crate::error::Result;

pub async fn ticker(service: &ExchangeManagementService, symbol: &Symbol) -> Result<()> {
    let ticker = service.get_aggregated_ticker(symbol).await?;
    if output::record("ticker", &ticker) {
        return Ok(());
    }

    output::section(&format!("{symbol} across {} venues", ticker.venues.len()));
    for (venue, quote) in &ticker.venues {
        output::field(
            &venue.to_string(),
            format!("bid {} / ask {}  last {}  vol {}", quote.bid, quote.ask, quote.last, quote.volume),
        );
    }
    output::section("Best");
    output::field(
        "Bid",
        output::or_dash(ticker.best_bid.map(|q| format!("{} on {}", q.price, q.venue))),
    );
    output::field(
        "Ask",
        output::or_dash(ticker.best_ask.map(|q| format!("{} on {}", q.price, q.venue))),
    );
    output::field("Spread", output::or_dash(ticker.spread));
    output::field("VWAP", output::or_dash(ticker.vwap));
    if ticker.is_crossed() {
        output::warning("Venues are crossed");
    }
    Ok(())
}

pub async fn book(service: &ExchangeManagementService, symbol: &Symbol, depth: usize) -> Result<()> {
    let book = service.get_aggregated_order_book(symbol, Some(depth)).await?;
    if output::record("book", &book) {
        return Ok(());
    }

    output::section(&format!("{symbol} asks"));
    for level in book.asks.iter().take(depth).rev() {
        output::line(format!("{:>16} {:>16}  {}", level.price, level.quantity, level.venue));
    }
    output::section(&format!("{symbol} bids"));
    for level in book.bids.iter().take(depth) {
        output::line(format!("{:>16} {:>16}  {}", level.price, level.quantity, level.venue));
    }
    output::section("Totals");
    output::field("Bid volume", book.total_bid_volume);
    output::field("Ask volume", book.total_ask_volume);
    output::field("Spread", output::or_dash(book.spread()));
    Ok(())
}

pub async fn balances(service: &ExchangeManagementService) -> Result<()> {
    let balances = service.get_portfolio_balances().await;
    if output::record("balances", &balances) {
        return Ok(());
    }
    if balances.is_empty() {
        output::warning("No balances reported");
        return Ok(());
    }

    for balance in &balances {
        output::section(&format!("{} total {}", balance.asset, balance.total));
        for (venue, holding) in &balance.venues {
            output::field(
                &venue.to_string(),
                format!(
                    "{} free, {} locked ({}%)",
                    holding.free,
                    holding.locked,
                    holding.allocation_pct.round_dp(2)
                ),
            );
        }
    }
    Ok(())
}

pub async fn arbitrage(service: &ExchangeManagementService, symbols: &[Symbol]) -> Result<()> {
    let opportunities = service.detect_arbitrage_opportunities(symbols).await;
    if output::record("arbitrage", &opportunities) {
        return Ok(());
    }
    if opportunities.is_empty() {
        output::line("No opportunities");
        return Ok(());
    }

    output::section("Opportunities");
    for o in &opportunities {
        output::line(format!(
            "{}  buy {} @ {}  sell {} @ {}  spread {}%  volume {}  profit {}",
            o.symbol,
            o.buy_venue,
            o.buy_price,
            o.sell_venue,
            o.sell_price,
            o.spread_pct.round_dp(4),
            o.max_volume,
            o.estimated_profit,
        ));
    }
    Ok(())
}
