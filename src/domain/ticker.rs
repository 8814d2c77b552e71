use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{Symbol, VenueId};

/// Point-in-time market snapshot for one symbol on one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub venue: VenueId,
    pub symbol: Symbol,
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    /// Base-asset volume over the venue's rolling 24h window.
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    /// Whether both sides of the quote are populated.
    #[must_use]
    pub fn is_quoted(&self) -> bool {
        self.bid > Decimal::ZERO && self.ask > Decimal::ZERO
    }
}
