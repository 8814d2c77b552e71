use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{Symbol, VenueId};
use super::order::Side;

/// Holdings of one asset on one venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub venue: VenueId,
    pub asset: String,
    pub free: Decimal,
    /// Amount reserved by open orders.
    pub locked: Decimal,
    pub total: Decimal,
}

impl Balance {
    pub fn new(venue: VenueId, asset: impl Into<String>, free: Decimal, locked: Decimal) -> Self {
        Self {
            venue,
            asset: asset.into(),
            free,
            locked,
            total: free + locked,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total.is_zero()
    }
}

/// Spot exposure to a symbol's base asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub venue: VenueId,
    pub symbol: Symbol,
    pub side: Side,
    pub size: Decimal,
}

/// Derive spot positions from balances: every non-empty base asset of a
/// requested symbol is a long position.
#[must_use]
pub fn positions_from_balances(balances: &[Balance], symbols: &[Symbol]) -> Vec<Position> {
    symbols
        .iter()
        .filter_map(|symbol| {
            let (base, _) = symbol.split()?;
            let balance = balances
                .iter()
                .find(|b| b.asset == base && !b.is_empty())?;
            Some(Position {
                venue: balance.venue,
                symbol: symbol.clone(),
                side: Side::Buy,
                size: balance.total,
            })
        })
        .collect()
}

/// Quote used to name positions when the caller asks for all of them.
pub const DEFAULT_POSITION_QUOTE: &str = "USDT";

/// Positions for `symbols`, or for every held non-quote asset when `None`.
#[must_use]
pub fn spot_positions(balances: &[Balance], symbols: Option<&[Symbol]>) -> Vec<Position> {
    match symbols {
        Some(symbols) => positions_from_balances(balances, symbols),
        None => {
            let held: Vec<Symbol> = balances
                .iter()
                .filter(|b| !b.is_empty() && b.asset != DEFAULT_POSITION_QUOTE)
                .map(|b| Symbol::from_assets(&b.asset, DEFAULT_POSITION_QUOTE))
                .collect();
            positions_from_balances(balances, &held)
        }
    }
}
