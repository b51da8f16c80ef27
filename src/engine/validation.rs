//! Order request validation
//!
//! The engine treats malformed input as a caller contract violation and
//! defaults defensively instead of rejecting (a zero or negative amount
//! simply produces no fills). This module is the upstream gate callers run
//! before `place_order`, so bad requests are caught with a real error
//! instead of silently doing nothing.

use rust_decimal::Decimal;

use crate::models::{OrderKind, OrderRequest};

use super::errors::OrderError;

/// Validate that the trading symbol is non-empty
pub fn validate_symbol(symbol: &str) -> Result<(), OrderError> {
    if symbol.trim().is_empty() {
        return Err(OrderError::InvalidSymbol(
            "Symbol must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validate that the requested amount is positive
pub fn validate_amount(amount: Decimal) -> Result<(), OrderError> {
    if amount <= Decimal::ZERO {
        return Err(OrderError::InvalidAmount(format!(
            "Amount must be positive, got: {}",
            amount
        )));
    }
    Ok(())
}

/// Validate the price carried by the order kind
///
/// Limit orders must quote a positive price; market orders carry none by
/// construction, so there is nothing to check.
pub fn validate_price(kind: &OrderKind) -> Result<(), OrderError> {
    match kind {
        OrderKind::Limit { price } if *price <= Decimal::ZERO => Err(OrderError::InvalidPrice(
            format!("Price must be positive, got: {}", price),
        )),
        _ => Ok(()),
    }
}

/// Validate an order request before handing it to the engine
///
/// Single entry point for intake validation; returns the first error
/// encountered.
pub fn validate_request(request: &OrderRequest) -> Result<(), OrderError> {
    validate_symbol(&request.symbol)?;
    validate_amount(request.amount)?;
    validate_price(&request.kind)?;
    Ok(())
}
