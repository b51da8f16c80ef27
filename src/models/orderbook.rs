use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use super::{Order, OrderSide, Trade};

/// Represents a price level in the order book
///
/// Order ids are kept in arrival order (front = earliest), which is what
/// gives the book its time priority at equal price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub total_quantity: Decimal,
    pub orders: VecDeque<u64>,
}

impl PriceLevel {
    /// Create a new price level
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            total_quantity: Decimal::ZERO,
            orders: VecDeque::new(),
        }
    }

    /// Add an order to the back of this price level
    pub fn add_order(&mut self, order_id: u64, quantity: Decimal) {
        self.orders.push_back(order_id);
        self.total_quantity += quantity;
    }

    /// Remove an order from this price level
    pub fn remove_order(&mut self, order_id: u64, remaining: Decimal) -> bool {
        if let Some(pos) = self.orders.iter().position(|&id| id == order_id) {
            self.orders.remove(pos);
            self.total_quantity -= remaining;
            return true;
        }
        false
    }

    /// Reduce the aggregate quantity after a fill against one of the level's orders
    pub fn reduce_quantity(&mut self, quantity: Decimal) {
        self.total_quantity -= quantity;
    }

    /// Check if this price level is empty
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// The order book for a single symbol
///
/// Both sides are price-sorted maps of FIFO levels, so the best bid is the
/// last bid key and the best ask is the first ask key. Only limit orders
/// with remaining quantity appear in the levels; the `orders` map holds the
/// order records themselves.
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub symbol: String,
    pub bids: BTreeMap<Decimal, PriceLevel>,
    pub asks: BTreeMap<Decimal, PriceLevel>,
    pub orders: HashMap<u64, Order>,
    pub trades: Vec<Trade>,
}

impl OrderBook {
    /// Create a new order book for a symbol
    pub fn new(symbol: String) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            trades: Vec::new(),
        }
    }

    /// Get the best bid price (highest buy price)
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    /// Get the best ask price (lowest sell price)
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Get the spread (difference between best ask and best bid)
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get the mid price (average of best bid and best ask)
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some((ask + bid) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Get an order by ID
    pub fn get_order(&self, order_id: u64) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Get a mutable reference to an order by ID
    pub fn get_order_mut(&mut self, order_id: u64) -> Option<&mut Order> {
        self.orders.get_mut(&order_id)
    }

    /// Number of resting orders in this book
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Add a trade to the history
    pub fn add_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    /// Get recent trades (last n trades)
    pub fn recent_trades(&self, limit: usize) -> Vec<Trade> {
        let start = self.trades.len().saturating_sub(limit);
        self.trades[start..].to_vec()
    }

    /// Get total resting quantity on the bid side
    pub fn bid_depth(&self) -> Decimal {
        Self::total_depth(&self.bids)
    }

    /// Get total resting quantity on the ask side
    pub fn ask_depth(&self) -> Decimal {
        Self::total_depth(&self.asks)
    }

    fn total_depth(levels: &BTreeMap<Decimal, PriceLevel>) -> Decimal {
        levels.values().map(|level| level.total_quantity).sum()
    }

    /// Build an aggregated, depth-limited view of the book
    ///
    /// Bids come out highest-first, asks lowest-first, each side truncated
    /// to `depth` price levels. This is a pure read; the book is untouched.
    pub fn depth_snapshot(&self, depth: usize) -> DepthSnapshot {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(price, level)| DepthLevel {
                price: *price,
                size: level.total_quantity,
            })
            .collect();

        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(price, level)| DepthLevel {
                price: *price,
                size: level.total_quantity,
            })
            .collect();

        DepthSnapshot {
            symbol: self.symbol.clone(),
            bids,
            asks,
            timestamp: Utc::now(),
        }
    }

    /// The side of the book a resting order of the given side lives on
    pub fn side_mut(&mut self, side: OrderSide) -> &mut BTreeMap<Decimal, PriceLevel> {
        match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        }
    }
}

/// One aggregated price level in a depth snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    /// Sum of remaining quantity across all orders at this price
    pub size: Decimal,
}

/// Aggregated order-book view returned by depth queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub timestamp: DateTime<Utc>,
}
