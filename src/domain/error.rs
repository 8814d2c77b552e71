//! Domain validation errors.
//!
//! These are returned when a request or a venue report violates one of the
//! domain invariants: non-negative quantities, `remaining = amount - filled`,
//! and the order lifecycle.

use rust_decimal::Decimal;
use thiserror::Error;

use super::order::{OrderStatus, OrderType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Order amounts must be positive.
    #[error("amount must be positive, got {amount}")]
    NonPositiveAmount { amount: Decimal },

    #[error("price must be positive, got {price}")]
    NonPositivePrice { price: Decimal },

    #[error("{order_type:?} order requires a price")]
    MissingPrice { order_type: OrderType },

    #[error("{order_type:?} order requires a stop price")]
    MissingStopPrice { order_type: OrderType },

    /// Filled quantity outside `0..=amount`.
    #[error("filled {filled} is out of range for amount {amount}")]
    InvalidFill { amount: Decimal, filled: Decimal },

    #[error("filled quantity decreased from {previous} to {reported}")]
    FillDecreased { previous: Decimal, reported: Decimal },

    #[error("invalid order transition {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("unknown timeframe: {0}")]
    UnknownTimeframe(String),

    #[error("slippage must be between 0 and 1, got {0}")]
    InvalidSlippage(Decimal),
}
