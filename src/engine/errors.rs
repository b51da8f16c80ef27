//! Error types for order intake
//!
//! The engine itself never fails on well-formed input: placement returns a
//! plain report and cancellation returns an `Option`. These errors exist
//! for the upstream validation step (see `validation`) that callers run
//! before handing a request to the engine.

use thiserror::Error;

/// Errors reported by request validation
#[derive(Debug, Error)]
pub enum OrderError {
    /// The trading symbol is empty
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Amount validation failed (negative or zero)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Price validation failed (negative or zero limit price)
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}
