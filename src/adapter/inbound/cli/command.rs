//! Command-line interface definitions.
//!
//! Defines the CLI structure for the venuebridge binary using `clap`. Every
//! subcommand works across all enabled venues at once.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

use crate::domain::{RoutingStrategy, Side, Symbol, VenueId};

/// Multi-venue crypto trading gateway CLI
#[derive(Parser, Debug)]
#[command(name = "venuebridge")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, short, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List configured venues and their connection state
    Venues,

    /// Show the cross-venue ticker for a symbol
    Ticker {
        #[arg(value_parser = parse_symbol)]
        symbol: Symbol,
    },

    /// Show the merged order book for a symbol
    Book {
        #[arg(value_parser = parse_symbol)]
        symbol: Symbol,
        /// Levels per venue and side
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show balances aggregated across venues
    Balances,

    /// Scan symbols for cross-venue arbitrage
    Arbitrage {
        #[arg(required = true, value_parser = parse_symbol)]
        symbols: Vec<Symbol>,
    },

    /// Stream the aggregated ticker (or book) until interrupted
    Watch {
        #[arg(value_parser = parse_symbol)]
        symbol: Symbol,
        /// Stream the merged order book instead of the ticker
        #[arg(long)]
        book: bool,
    },

    /// Route an order across venues
    Route(RouteArgs),

    /// Cancel an order on one venue
    Cancel {
        venue: VenueId,
        order_id: String,
    },
}

/// Arguments for `venuebridge route`.
#[derive(clap::Args, Debug)]
pub struct RouteArgs {
    pub side: SideArg,

    #[arg(value_parser = parse_symbol)]
    pub symbol: Symbol,

    /// Base quantity
    pub amount: Decimal,

    /// Limit price; market order when omitted
    #[arg(long)]
    pub price: Option<Decimal>,

    #[arg(long, value_enum, default_value_t = StrategyArg::BestPrice)]
    pub strategy: StrategyArg,

    /// Send the whole order to this venue
    #[arg(long)]
    pub venue: Option<VenueId>,

    /// Reject market orders whose expected slippage exceeds this fraction
    #[arg(long)]
    pub max_slippage: Option<Decimal>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SideArg {
    Buy,
    Sell,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Buy => Self::Buy,
            SideArg::Sell => Self::Sell,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StrategyArg {
    BestPrice,
    LowestFee,
    HighestLiquidity,
    SplitOrder,
}

impl From<StrategyArg> for RoutingStrategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::BestPrice => Self::BestPrice,
            StrategyArg::LowestFee => Self::LowestFee,
            StrategyArg::HighestLiquidity => Self::HighestLiquidity,
            StrategyArg::SplitOrder => Self::SplitOrder,
        }
    }
}

fn parse_symbol(raw: &str) -> Result<Symbol, String> {
    let symbol = Symbol::new(raw.trim());
    if symbol.as_str().is_empty() {
        return Err("symbol must not be empty".into());
    }
    Ok(symbol)
}
