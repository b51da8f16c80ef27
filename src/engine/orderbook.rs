//! Matching engine
//!
//! The `MatchingEngine` owns one order book per traded symbol and is the
//! single entry point for placement, cancellation, startup restoration and
//! depth queries. Each book sits behind its own mutex, so operations on
//! one symbol serialize while distinct symbols proceed in parallel.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::models::{
    DepthSnapshot, Order, OrderBook, OrderKind, OrderRequest, OrderStatus, PersistedOrder,
    PriceLevel, Trade,
};

use super::matching::{match_order, SelfTradePolicy};

/// Monotonic id generator backed by an atomic counter
#[derive(Debug)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    /// Create a sequence whose next issued id is `first`
    pub fn starting_at(first: u64) -> Self {
        Self(AtomicU64::new(first))
    }

    /// Issue the next id
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Ensure future ids are strictly greater than `seen`
    pub fn advance_past(&self, seen: u64) {
        self.0.fetch_max(seen + 1, Ordering::Relaxed);
    }
}

// ============================================================================
// Order Book Helper Functions
// ============================================================================

/// Insert a resting limit order into its side of the book
///
/// A fresh insertion goes to the back of its price level, so it arrives
/// after existing same-price entries.
fn insert_resting_order(book: &mut OrderBook, order: Order, price: Decimal) {
    let level = book
        .side_mut(order.side)
        .entry(price)
        .or_insert_with(|| PriceLevel::new(price));
    level.add_order(order.id, order.remaining);
    book.orders.insert(order.id, order);
}

/// Remove a resting order from the book, reclaiming its level if emptied
fn remove_resting_order(book: &mut OrderBook, order_id: u64) -> Option<Order> {
    let order = book.orders.remove(&order_id)?;
    if let Some(price) = order.kind.price() {
        let levels = book.side_mut(order.side);
        if let Some(level) = levels.get_mut(&price) {
            level.remove_order(order_id, order.remaining);
            if level.is_empty() {
                levels.remove(&price);
            }
        }
    }
    Some(order)
}

/// Outcome of an order placement
///
/// The caller is responsible for persisting `fills` as trade records and
/// updating the placed order's stored status based on `unfilled_remainder`.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Final state of the placed order
    pub order: Order,
    /// Trades emitted, in execution order
    pub fills: Vec<Trade>,
    /// The order as inserted into the book, if a limit remainder rested
    pub resting_order: Option<Order>,
    /// Quantity that did not execute
    pub unfilled_remainder: Decimal,
    /// Resting orders cancelled by self-trade prevention
    pub cancelled: Vec<Order>,
}

/// Thread-safe matching engine: one order book per symbol
///
/// All state is owned by the instance; multiple engines coexist without
/// interference (one per test, one per shard).
pub struct MatchingEngine {
    books: DashMap<String, Mutex<OrderBook>>,
    /// Order id -> symbol, maintained on every insert/remove so
    /// cancellation is a direct lookup instead of a full-book scan
    order_index: DashMap<u64, String>,
    order_ids: IdSequence,
    trade_ids: IdSequence,
    self_trade_policy: SelfTradePolicy,
}

impl MatchingEngine {
    /// Create a new engine with the default self-trade policy
    pub fn new() -> Self {
        Self::with_policy(SelfTradePolicy::default())
    }

    /// Create a new engine with an explicit self-trade policy
    pub fn with_policy(policy: SelfTradePolicy) -> Self {
        Self {
            books: DashMap::new(),
            order_index: DashMap::new(),
            order_ids: IdSequence::starting_at(1),
            trade_ids: IdSequence::starting_at(1),
            self_trade_policy: policy,
        }
    }

    /// Get the book for a symbol, creating an empty one on first reference
    fn book(&self, symbol: &str) -> dashmap::mapref::one::Ref<'_, String, Mutex<OrderBook>> {
        if let Some(book) = self.books.get(symbol) {
            return book;
        }
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| Mutex::new(OrderBook::new(symbol.to_string())))
            .downgrade()
    }

    /// Place an order and match it against the book for its symbol
    ///
    /// Never fails: a request with nothing to match comes back with an
    /// empty `fills` list, which is an expected outcome. Zero-amount
    /// requests produce no fills and never rest.
    pub fn place_order(&self, request: OrderRequest) -> ExecutionReport {
        let OrderRequest {
            user_id,
            symbol,
            side,
            kind,
            amount,
        } = request;

        let mut order = Order::new(
            self.order_ids.next(),
            symbol.clone(),
            side,
            kind,
            amount,
            user_id,
        );

        let book_ref = self.book(&symbol);
        let mut book = book_ref.lock();

        let outcome = match_order(&mut book, &mut order, self.self_trade_policy, &self.trade_ids);

        for maker_id in &outcome.removed_maker_ids {
            self.order_index.remove(maker_id);
        }
        for cancelled in &outcome.cancelled {
            self.order_index.remove(&cancelled.id);
        }
        for trade in &outcome.trades {
            book.add_trade(trade.clone());
        }

        // A limit remainder rests; a market remainder is discarded
        let mut resting_order = None;
        if order.status != OrderStatus::Cancelled && !order.is_filled() {
            if let OrderKind::Limit { price } = order.kind {
                insert_resting_order(&mut book, order.clone(), price);
                self.order_index.insert(order.id, symbol.clone());
                resting_order = Some(order.clone());
            }
        }

        drop(book);

        debug!(
            order_id = order.id,
            symbol = %symbol,
            fills = outcome.trades.len(),
            remaining = %order.remaining,
            "order placed"
        );

        ExecutionReport {
            unfilled_remainder: order.remaining,
            order,
            fills: outcome.trades,
            resting_order,
            cancelled: outcome.cancelled,
        }
    }

    /// Cancel a resting order
    ///
    /// Returns the removed order, or `None` if the id is not currently
    /// resting (already filled, already cancelled, or unknown), which is a
    /// normal outcome, not a failure. Cancellation is all-or-nothing on the
    /// order's current remaining quantity.
    pub fn cancel(&self, order_id: u64) -> Option<Order> {
        let symbol = self
            .order_index
            .get(&order_id)
            .map(|entry| entry.value().clone())?;

        let removed = {
            let book_ref = self.book(&symbol);
            let mut book = book_ref.lock();
            remove_resting_order(&mut book, order_id)
        };
        self.order_index.remove(&order_id);

        let mut order = removed?;
        order.status = OrderStatus::Cancelled;
        debug!(order_id, symbol = %symbol, remaining = %order.remaining, "order cancelled");
        Some(order)
    }

    /// Rebuild the books from previously persisted orders
    ///
    /// Called once at startup, before the engine accepts any placement or
    /// cancellation. Records that are filled or cancelled are skipped, as
    /// are market orders (no resting market orders). Eligible orders are
    /// inserted in ascending id order: ids are assigned monotonically at
    /// placement, so id order is arrival order and time priority is
    /// reproduced exactly. Both id sequences advance past the maximum id
    /// seen, so freshly assigned ids never collide with persisted records.
    pub fn restore(&self, persisted: Vec<PersistedOrder>) {
        let mut max_id = 0u64;
        let mut eligible = Vec::new();
        let mut skipped = 0usize;

        for record in persisted {
            max_id = max_id.max(record.id);
            if matches!(record.status, OrderStatus::Filled | OrderStatus::Cancelled) {
                skipped += 1;
                continue;
            }
            let order = record.into_order();
            if !order.kind.is_limit() || order.remaining <= Decimal::ZERO {
                skipped += 1;
                continue;
            }
            eligible.push(order);
        }

        eligible.sort_by_key(|order| order.id);

        let restored = eligible.len();
        for order in eligible {
            let id = order.id;
            let symbol = order.symbol.clone();
            if let OrderKind::Limit { price } = order.kind {
                let book_ref = self.book(&symbol);
                let mut book = book_ref.lock();
                insert_resting_order(&mut book, order, price);
            }
            self.order_index.insert(id, symbol);
        }

        self.order_ids.advance_past(max_id);
        self.trade_ids.advance_past(max_id);
        info!(restored, skipped, "order books restored");
    }

    /// Get an aggregated, depth-limited view of a symbol's book
    ///
    /// Pure read: levels are summed per price, bids descending, asks
    /// ascending, each side truncated to `depth`.
    pub fn get_order_book(&self, symbol: &str, depth: usize) -> DepthSnapshot {
        let book_ref = self.book(symbol);
        let book = book_ref.lock();
        book.depth_snapshot(depth)
    }

    /// Get a resting order by id
    pub fn get_order(&self, order_id: u64) -> Option<Order> {
        let symbol = self
            .order_index
            .get(&order_id)
            .map(|entry| entry.value().clone())?;
        let book_ref = self.book(&symbol);
        let book = book_ref.lock();
        book.get_order(order_id).cloned()
    }

    /// Get recent trades for a symbol (last n trades)
    pub fn recent_trades(&self, symbol: &str, limit: usize) -> Vec<Trade> {
        let book_ref = self.book(symbol);
        let book = book_ref.lock();
        book.recent_trades(limit)
    }

    /// Get all active symbols
    pub fn symbols(&self) -> Vec<String> {
        self.books.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Total number of resting orders across all symbols
    pub fn open_order_count(&self) -> usize {
        self.books
            .iter()
            .map(|entry| entry.value().lock().order_count())
            .sum()
    }

    /// Total number of trades across all symbols
    pub fn trade_count(&self) -> usize {
        self.books
            .iter()
            .map(|entry| entry.value().lock().trades.len())
            .sum()
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}
