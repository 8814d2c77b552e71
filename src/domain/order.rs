//! Orders and their lifecycle.
//!
//! Every venue's order vocabulary is mapped onto one state machine:
//!
//! ```text
//! pending -> open -> { closed | canceled | expired | rejected }
//!            open -> open            (partial fill)
//! pending -> { closed | canceled | expired | rejected }
//! ```
//!
//! `pending` and `open` are the only non-terminal states. Terminal states
//! never change again.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::id::{OrderId, Symbol, VenueId};
use super::trade::Fee;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
    TakeProfitMarket,
    TakeProfitLimit,
}

impl OrderType {
    pub const ALL: [Self; 6] = [
        Self::Market,
        Self::Limit,
        Self::StopMarket,
        Self::StopLimit,
        Self::TakeProfitMarket,
        Self::TakeProfitLimit,
    ];

    /// Whether a limit price must accompany the order.
    #[must_use]
    pub const fn requires_price(self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit | Self::TakeProfitLimit)
    }

    /// Whether a trigger price must accompany the order.
    #[must_use]
    pub const fn requires_stop_price(self) -> bool {
        matches!(
            self,
            Self::StopMarket | Self::StopLimit | Self::TakeProfitMarket | Self::TakeProfitLimit
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good till canceled.
    #[default]
    Gtc,
    /// Immediate or cancel.
    Ioc,
    /// Fill or kill.
    Fok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Open,
    Closed,
    Canceled,
    Expired,
    Rejected,
}

impl OrderStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Open)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => true,
            Self::Open => !matches!(next, Self::Pending),
            Self::Closed | Self::Canceled | Self::Expired | Self::Rejected => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Rejected => "rejected",
        })
    }
}

/// A uniform order request, translated by each adapter into its wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub order_type: OrderType,
    pub side: Side,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    pub client_id: Option<String>,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: Side, amount: Decimal) -> Self {
        Self {
            symbol,
            order_type: OrderType::Market,
            side,
            amount,
            price: None,
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            client_id: None,
        }
    }

    pub fn limit(symbol: Symbol, side: Side, amount: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(symbol, side, amount)
        }
    }

    /// Check the request is complete before it reaches any venue.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::NonPositiveAmount {
                amount: self.amount,
            });
        }
        if self.order_type.requires_price() && self.price.is_none() {
            return Err(DomainError::MissingPrice {
                order_type: self.order_type,
            });
        }
        if self.order_type.requires_stop_price() && self.stop_price.is_none() {
            return Err(DomainError::MissingStopPrice {
                order_type: self.order_type,
            });
        }
        if let Some(price) = self.price {
            if price <= Decimal::ZERO {
                return Err(DomainError::NonPositivePrice { price });
            }
        }
        Ok(())
    }

    /// The client id to send, generating one when the caller gave none.
    #[must_use]
    pub fn client_id_or_generate(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
    }
}

/// An order as last reported by its venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub venue: VenueId,
    pub id: OrderId,
    pub client_id: Option<String>,
    pub symbol: Symbol,
    pub order_type: OrderType,
    pub side: Side,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    /// Volume-weighted fill price, when known.
    pub average: Option<Decimal>,
    filled: Decimal,
    remaining: Decimal,
    status: OrderStatus,
    pub fee: Option<Fee>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Builder input for [`Order::new`]; fields mirror the venue payload.
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub venue: VenueId,
    pub id: OrderId,
    pub client_id: Option<String>,
    pub symbol: Symbol,
    pub order_type: OrderType,
    pub side: Side,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub average: Option<Decimal>,
    pub filled: Decimal,
    pub status: OrderStatus,
    pub fee: Option<Fee>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Construct an order, deriving `remaining` from amount and filled.
    pub fn new(snapshot: OrderSnapshot) -> Result<Self, DomainError> {
        check_fill(snapshot.amount, snapshot.filled)?;
        Ok(Self {
            venue: snapshot.venue,
            id: snapshot.id,
            client_id: snapshot.client_id,
            symbol: snapshot.symbol,
            order_type: snapshot.order_type,
            side: snapshot.side,
            amount: snapshot.amount,
            price: snapshot.price,
            average: snapshot.average,
            filled: snapshot.filled,
            remaining: snapshot.amount - snapshot.filled,
            status: snapshot.status,
            fee: snapshot.fee,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        })
    }

    #[must_use]
    pub const fn filled(&self) -> Decimal {
        self.filled
    }

    #[must_use]
    pub const fn remaining(&self) -> Decimal {
        self.remaining
    }

    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Price to report for this order's fills.
    #[must_use]
    pub fn fill_price(&self) -> Decimal {
        self.average.or(self.price).unwrap_or(Decimal::ZERO)
    }

    /// Apply a newer venue report, enforcing the lifecycle.
    ///
    /// Filled quantity never decreases and a terminal order is never revived.
    pub fn apply_update(
        &mut self,
        status: OrderStatus,
        filled: Decimal,
        average: Option<Decimal>,
    ) -> Result<(), DomainError> {
        if status != self.status && !self.status.can_transition_to(status) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        if status == self.status && self.status.is_terminal() {
            return Ok(());
        }
        check_fill(self.amount, filled)?;
        if filled < self.filled {
            return Err(DomainError::FillDecreased {
                previous: self.filled,
                reported: filled,
            });
        }
        self.status = status;
        self.filled = filled;
        self.remaining = self.amount - filled;
        if average.is_some() {
            self.average = average;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn check_fill(amount: Decimal, filled: Decimal) -> Result<(), DomainError> {
    if amount < Decimal::ZERO || filled < Decimal::ZERO || filled > amount {
        return Err(DomainError::InvalidFill { amount, filled });
    }
    Ok(())
}
