//! Smart order routing: venue selection and result accounting.

use std::time::Duration;

use rust_decimal::{Decimal, RoundingStrategy as Rounding};
use serde::{Deserialize, Serialize};

use super::book::{average_fill_price, OrderBook};
use super::error::DomainError;
use super::id::{OrderId, Symbol, VenueId};
use super::order::{Order, OrderRequest, OrderStatus, Side};
use super::ticker::Ticker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Lowest ask for a buy, highest bid for a sell.
    #[default]
    BestPrice,
    /// Highest configured priority among connected venues.
    LowestFee,
    /// Deepest book on the side the order consumes.
    HighestLiquidity,
    /// Equal slices on every eligible venue.
    SplitOrder,
}

/// A venue-agnostic routing intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartOrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub amount: Decimal,
    /// Limit price; absent means a market order.
    pub price: Option<Decimal>,
    #[serde(default)]
    pub strategy: RoutingStrategy,
    pub preferred_venue: Option<VenueId>,
    /// Maximum tolerated slippage as a fraction of top-of-book.
    pub max_slippage: Option<Decimal>,
}

impl SmartOrderRequest {
    pub fn new(symbol: Symbol, side: Side, amount: Decimal) -> Self {
        Self {
            symbol,
            side,
            amount,
            price: None,
            strategy: RoutingStrategy::default(),
            preferred_venue: None,
            max_slippage: None,
        }
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    #[must_use]
    pub const fn with_preferred_venue(mut self, venue: VenueId) -> Self {
        self.preferred_venue = Some(venue);
        self
    }

    #[must_use]
    pub const fn with_max_slippage(mut self, max_slippage: Decimal) -> Self {
        self.max_slippage = Some(max_slippage);
        self
    }

    #[must_use]
    pub const fn is_market(&self) -> bool {
        self.price.is_none()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(slippage) = self.max_slippage {
            if slippage < Decimal::ZERO || slippage > Decimal::ONE {
                return Err(DomainError::InvalidSlippage(slippage));
            }
        }
        self.child_request(self.amount).validate()
    }

    /// The single-venue order for one slice of this request.
    #[must_use]
    pub fn child_request(&self, amount: Decimal) -> OrderRequest {
        match self.price {
            Some(price) => OrderRequest::limit(self.symbol.clone(), self.side, amount, price),
            None => OrderRequest::market(self.symbol.clone(), self.side, amount),
        }
    }
}

/// One venue's part of a routed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildOrder {
    pub venue: VenueId,
    pub order_id: OrderId,
    pub requested: Decimal,
    pub filled: Decimal,
    pub price: Decimal,
    pub status: OrderStatus,
    pub fee: Decimal,
}

impl ChildOrder {
    #[must_use]
    pub fn from_order(order: &Order, requested: Decimal) -> Self {
        Self {
            venue: order.venue,
            order_id: order.id.clone(),
            requested,
            filled: order.filled(),
            price: order.fill_price(),
            status: order.status(),
            fee: order.fee.as_ref().map_or(Decimal::ZERO, |f| f.cost),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartOrderResult {
    pub strategy: RoutingStrategy,
    pub children: Vec<ChildOrder>,
    pub total_amount: Decimal,
    /// Fill-weighted average across children.
    pub average_price: Decimal,
    pub total_fee: Decimal,
    pub execution_time: Duration,
}

impl SmartOrderResult {
    /// Account for the successfully submitted children.
    #[must_use]
    pub fn summarize(
        strategy: RoutingStrategy,
        children: Vec<ChildOrder>,
        execution_time: Duration,
    ) -> Self {
        let total_amount: Decimal = children.iter().map(|c| c.filled).sum();
        let notional: Decimal = children.iter().map(|c| c.filled * c.price).sum();
        let average_price = if total_amount > Decimal::ZERO {
            notional / total_amount
        } else {
            Decimal::ZERO
        };
        Self {
            strategy,
            total_fee: children.iter().map(|c| c.fee).sum(),
            total_amount,
            average_price,
            children,
            execution_time,
        }
    }
}

/// Venue quoting the best price for a taker on `side`.
#[must_use]
pub fn select_best_price(tickers: &[Ticker], side: Side) -> Option<VenueId> {
    let quoted = tickers.iter().filter(|t| t.is_quoted());
    match side {
        Side::Buy => quoted.min_by_key(|t| t.ask),
        Side::Sell => quoted.max_by_key(|t| t.bid),
    }
    .map(|t| t.venue)
}

/// Highest-priority venue; ties resolve to the first candidate.
#[must_use]
pub fn select_highest_priority(candidates: &[(VenueId, u8)]) -> Option<VenueId> {
    candidates
        .iter()
        .fold(None::<(VenueId, u8)>, |best, &(venue, priority)| match best {
            Some((_, p)) if p >= priority => best,
            _ => Some((venue, priority)),
        })
        .map(|(venue, _)| venue)
}

/// Venue whose book offers the most quantity to a taker on `side`.
#[must_use]
pub fn select_deepest(books: &[OrderBook], side: Side) -> Option<VenueId> {
    books
        .iter()
        .map(|b| (b.venue, b.depth(side)))
        .filter(|(_, depth)| *depth > Decimal::ZERO)
        .fold(None::<(VenueId, Decimal)>, |best, (venue, depth)| match best {
            Some((_, d)) if d >= depth => best,
            _ => Some((venue, depth)),
        })
        .map(|(venue, _)| venue)
}

/// Split `amount` into `parts` slices truncated to `scale` decimals; the last
/// slice absorbs the rounding remainder so the slices sum to `amount`.
#[must_use]
pub fn split_amount(amount: Decimal, parts: usize, scale: u32) -> Vec<Decimal> {
    if parts == 0 {
        return Vec::new();
    }
    let slice = (amount / Decimal::from(parts)).round_dp_with_strategy(scale, Rounding::ToZero);
    let mut slices = vec![slice; parts];
    let allocated = slice * Decimal::from(parts - 1);
    slices[parts - 1] = amount - allocated;
    slices
}

/// Relative distance between top-of-book and the average price a taker on
/// `side` would pay for `amount`. `None` when the book is too thin.
#[must_use]
pub fn expected_slippage(book: &OrderBook, side: Side, amount: Decimal) -> Option<Decimal> {
    let levels = book.liquidity_side(side);
    let top = levels.first()?.price;
    if top <= Decimal::ZERO {
        return None;
    }
    let average = average_fill_price(levels, amount)?;
    Some(((average - top) / top).abs())
}
