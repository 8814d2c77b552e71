use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{OrderId, Symbol, VenueId};
use super::order::Side;

/// Fee charged on a fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub cost: Decimal,
    pub asset: String,
}

/// An executed fill. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub venue: VenueId,
    pub id: String,
    pub order_id: Option<OrderId>,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    pub fee: Option<Fee>,
    /// `None` when the venue does not disclose liquidity role (public trades).
    pub is_maker: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.amount
    }
}
