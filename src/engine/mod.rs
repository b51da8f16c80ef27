//! Matching Engine Module
//!
//! This module contains the core matching functionality:
//! - `errors` - Error types for order intake
//! - `validation` - Order request validation
//! - `matching` - Price/time priority matching algorithm
//! - `orderbook` - The engine itself (per-symbol book registry)

pub mod errors;
pub mod matching;
pub mod orderbook;
pub mod validation;

// Re-export commonly used types for convenience
pub use errors::OrderError;
pub use matching::{match_order, MatchOutcome, SelfTradePolicy};
pub use orderbook::{ExecutionReport, IdSequence, MatchingEngine};
pub use validation::validate_request;
