//! Continuous double-auction order-matching engine
//!
//! Accepts buy/sell orders per symbol, matches them against a resting book
//! using price/time priority, produces trade records, and exposes
//! aggregated depth views. The engine holds no durable state: the
//! surrounding system feeds it placement/cancellation requests plus the
//! previously-open orders to restore at startup, and persists the trades
//! and order statuses it reports back.

pub mod engine;
pub mod models;

// Re-export the public surface at the crate root
pub use engine::{
    validate_request, ExecutionReport, MatchingEngine, OrderError, SelfTradePolicy,
};
pub use models::{
    DepthLevel, DepthSnapshot, Order, OrderBook, OrderKind, OrderRequest, OrderSide, OrderStatus,
    PersistedOrder, Trade,
};
