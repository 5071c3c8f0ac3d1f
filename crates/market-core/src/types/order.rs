//! Order and fill types for execution.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signal::Direction;

/// Side of the order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Entry side for a position direction: long enters with a buy,
    /// short with a sell. Exit side is the opposite.
    pub fn entry_for(direction: Direction) -> OrderSide {
        match direction {
            Direction::Short => OrderSide::Sell,
            _ => OrderSide::Buy,
        }
    }

    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Role an order plays in the position lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Entry,
    Exit,
}

/// Current status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created but not yet submitted.
    Created,
    /// Order submitted to the venue.
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// An order owned by the lifecycle manager while pending; read-only history
/// after reaching a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub market_id: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
    /// Price the order was marked at on submission.
    pub limit_price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    /// Submission attempts made (for retry bookkeeping).
    pub attempts: u32,
    /// Venue-assigned reference, set after a successful submission.
    pub venue_order_id: Option<String>,
}

impl Order {
    pub fn new(
        market_id: impl Into<String>,
        side: OrderSide,
        kind: OrderKind,
        quantity: Decimal,
        limit_price: Option<Decimal>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            market_id: market_id.into(),
            side,
            kind,
            quantity,
            limit_price,
            status: OrderStatus::Created,
            created_at: Utc::now(),
            filled_quantity: Decimal::ZERO,
            average_fill_price: None,
            attempts: 0,
            venue_order_id: None,
        }
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }

    /// Record a (possibly partial) fill, updating the volume-weighted
    /// average price and status.
    pub fn record_fill(&mut self, price: Decimal, quantity: Decimal) {
        let prior_notional = self
            .average_fill_price
            .map(|p| p * self.filled_quantity)
            .unwrap_or(Decimal::ZERO);
        self.filled_quantity += quantity;
        if self.filled_quantity > Decimal::ZERO {
            self.average_fill_price =
                Some((prior_notional + price * quantity) / self.filled_quantity);
        }
        self.status = if self.is_fully_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }
}

/// A fill reported by the execution gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: Uuid,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}
