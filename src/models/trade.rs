use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderSide;

/// Represents a completed trade between two orders
///
/// The price is always the maker's resting price: price improvement goes
/// to the order that was in the book first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Unique, monotonically assigned; independent counter from order ids
    pub id: u64,
    pub symbol: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub taker_order_id: u64,
    pub maker_order_id: u64,
    pub taker_side: OrderSide,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Create a new trade
    pub fn new(
        id: u64,
        symbol: String,
        price: Decimal,
        amount: Decimal,
        taker_order_id: u64,
        maker_order_id: u64,
        taker_side: OrderSide,
    ) -> Self {
        Self {
            id,
            symbol,
            price,
            amount,
            taker_order_id,
            maker_order_id,
            taker_side,
            timestamp: Utc::now(),
        }
    }

    /// Get the total trade value
    pub fn value(&self) -> Decimal {
        self.price * self.amount
    }
}
