use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Represents a trading order owned by the matching engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique, monotonically assigned by the engine; stable for the order's lifetime
    pub id: u64,
    pub user_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Quantity requested at placement; immutable after creation
    pub amount: Decimal,
    /// Quantity not yet matched; monotonically non-increasing
    pub remaining: Decimal,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

/// Order side: Buy or Sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side an incoming order of this side matches against
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Order kind: Limit (carries its price) or Market
///
/// The price lives inside the `Limit` variant so a limit order without a
/// price is unrepresentable. Market orders never rest in a book, so no
/// resting order can lack a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OrderKind {
    Limit { price: Decimal },
    Market,
}

impl OrderKind {
    /// The limit price, if any
    pub fn price(&self) -> Option<Decimal> {
        match self {
            OrderKind::Limit { price } => Some(*price),
            OrderKind::Market => None,
        }
    }

    pub fn is_limit(&self) -> bool {
        matches!(self, OrderKind::Limit { .. })
    }
}

/// Order status throughout its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl Order {
    /// Create a new order with the engine-assigned id
    ///
    /// Negative requested amounts are clamped to zero: a zero-amount order
    /// produces no fills and never rests.
    pub fn new(
        id: u64,
        symbol: String,
        side: OrderSide,
        kind: OrderKind,
        amount: Decimal,
        user_id: String,
    ) -> Self {
        let amount = amount.max(Decimal::ZERO);
        Self {
            id,
            user_id,
            symbol,
            side,
            kind,
            amount,
            remaining: amount,
            status: OrderStatus::New,
            timestamp: Utc::now(),
        }
    }

    /// Get the quantity matched so far
    pub fn filled_amount(&self) -> Decimal {
        self.amount - self.remaining
    }

    /// Check if the order is fully filled
    pub fn is_filled(&self) -> bool {
        self.remaining <= Decimal::ZERO
    }

    /// Fill the order with a given quantity
    pub fn fill(&mut self, quantity: Decimal) {
        self.remaining -= quantity;
        self.update_status();
    }

    /// Update order status based on remaining quantity
    pub fn update_status(&mut self) {
        if self.is_filled() {
            self.status = OrderStatus::Filled;
        } else if self.remaining < self.amount {
            self.status = OrderStatus::PartiallyFilled;
        }
    }
}

/// An order placement request, before the engine has assigned an id
///
/// This is the shape the surrounding system hands to the engine's
/// `place_order`; callers are expected to run it through
/// `validate_request` first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user_id: String,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(flatten)]
    pub kind: OrderKind,
    pub amount: Decimal,
}

/// An order record as previously persisted by the surrounding system
///
/// Used only by `restore` to rebuild books at startup. `remaining` may be
/// absent in older records, in which case it defaults to `amount`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedOrder {
    pub id: u64,
    pub user_id: String,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(flatten)]
    pub kind: OrderKind,
    pub amount: Decimal,
    #[serde(default)]
    pub remaining: Option<Decimal>,
    pub status: OrderStatus,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl PersistedOrder {
    /// Normalize the record into a live order
    ///
    /// A missing `remaining` defaults to `amount`; values outside
    /// `0..=amount` are clamped back into range.
    pub fn into_order(self) -> Order {
        let remaining = self
            .remaining
            .unwrap_or(self.amount)
            .clamp(Decimal::ZERO, self.amount);
        Order {
            id: self.id,
            user_id: self.user_id,
            symbol: self.symbol,
            side: self.side,
            kind: self.kind,
            amount: self.amount,
            remaining,
            status: self.status,
            timestamp: self.timestamp,
        }
    }
}
