//! Order matching
//!
//! Walks the opposing side of a book best-price-first, trading against
//! resting makers until the incoming order is filled, the side is
//! exhausted, or price compatibility fails. Price compatibility is checked
//! once per price level: the sides are price-sorted, so the first
//! incompatible level ends the walk.

use rust_decimal::Decimal;
use tracing::trace;

use crate::models::{Order, OrderBook, OrderSide, OrderStatus, Trade};

use super::orderbook::IdSequence;

/// Policy applied when an incoming order would trade against a resting
/// order from the same user
///
/// The engine applies one policy uniformly; it is not a per-order flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelfTradePolicy {
    /// Let the orders trade against each other
    #[default]
    Allow,
    /// Cancel the resting order and keep matching
    CancelResting,
    /// Cancel the incoming order and stop matching
    CancelIncoming,
}

/// Result of matching one incoming order against a book
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// Trades emitted, in execution order
    pub trades: Vec<Trade>,
    /// Ids of makers removed because they were fully filled
    pub removed_maker_ids: Vec<u64>,
    /// Resting orders cancelled by self-trade prevention
    pub cancelled: Vec<Order>,
}

/// Match an incoming order against the order book
///
/// Both the incoming order and any touched makers have their remaining
/// quantity decremented here; fully filled makers are removed from the
/// book with their priority slot reclaimed. The incoming order is NOT
/// inserted into the book; resting the remainder is the engine's job.
pub fn match_order(
    book: &mut OrderBook,
    incoming: &mut Order,
    policy: SelfTradePolicy,
    trade_ids: &IdSequence,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();

    // Prices the incoming order can trade at, best first. A market order
    // takes any resting price; a limit order stops at its own price.
    let prices = compatible_prices(book, incoming);

    for price in prices {
        if incoming.is_filled() {
            break;
        }

        let stop = match_at_level(book, incoming, price, policy, trade_ids, &mut outcome);

        // Reclaim the level if everything at this price was consumed
        let levels = book.side_mut(incoming.side.opposite());
        if levels.get(&price).map(|level| level.is_empty()).unwrap_or(false) {
            levels.remove(&price);
        }

        if stop {
            break;
        }
    }

    outcome
}

/// Collect the opposing price levels the incoming order is compatible with
fn compatible_prices(book: &OrderBook, incoming: &Order) -> Vec<Decimal> {
    match incoming.side {
        // Buy takes asks from the lowest up to its limit price
        OrderSide::Buy => {
            let limit = incoming.kind.price().unwrap_or(Decimal::MAX);
            book.asks.range(..=limit).map(|(price, _)| *price).collect()
        }
        // Sell takes bids from the highest down to its limit price
        OrderSide::Sell => {
            let limit = incoming.kind.price().unwrap_or(Decimal::MIN);
            book.bids
                .range(limit..)
                .rev()
                .map(|(price, _)| *price)
                .collect()
        }
    }
}

/// Match the incoming order against every maker at one price level, in
/// time priority order
///
/// Returns true if matching must stop entirely (incoming order cancelled
/// by self-trade prevention).
fn match_at_level(
    book: &mut OrderBook,
    incoming: &mut Order,
    price: Decimal,
    policy: SelfTradePolicy,
    trade_ids: &IdSequence,
    outcome: &mut MatchOutcome,
) -> bool {
    let maker_ids: Vec<u64> = {
        let levels = match incoming.side {
            OrderSide::Buy => &book.asks,
            OrderSide::Sell => &book.bids,
        };
        levels
            .get(&price)
            .map(|level| level.orders.iter().copied().collect())
            .unwrap_or_default()
    };

    for maker_id in maker_ids {
        if incoming.is_filled() {
            return false;
        }

        let (maker_user_matches, maker_remaining) = match book.orders.get(&maker_id) {
            Some(maker) => (maker.user_id == incoming.user_id, maker.remaining),
            None => continue,
        };

        if maker_user_matches {
            match policy {
                SelfTradePolicy::Allow => {}
                SelfTradePolicy::CancelResting => {
                    if let Some(mut maker) = book.orders.remove(&maker_id) {
                        maker.status = OrderStatus::Cancelled;
                        if let Some(level) =
                            book.side_mut(incoming.side.opposite()).get_mut(&price)
                        {
                            level.remove_order(maker_id, maker.remaining);
                        }
                        outcome.cancelled.push(maker);
                    }
                    continue;
                }
                SelfTradePolicy::CancelIncoming => {
                    incoming.status = OrderStatus::Cancelled;
                    return true;
                }
            }
        }

        let quantity = incoming.remaining.min(maker_remaining);
        if quantity <= Decimal::ZERO {
            continue;
        }

        // Maker price priority: the trade prints at the resting price
        let trade = Trade::new(
            trade_ids.next(),
            book.symbol.clone(),
            price,
            quantity,
            incoming.id,
            maker_id,
            incoming.side,
        );

        incoming.fill(quantity);

        let mut maker_filled = false;
        if let Some(maker) = book.orders.get_mut(&maker_id) {
            maker.fill(quantity);
            maker_filled = maker.is_filled();
        }

        if let Some(level) = book.side_mut(incoming.side.opposite()).get_mut(&price) {
            level.reduce_quantity(quantity);
            if maker_filled {
                // Remaining is already zero; this just frees the queue slot
                level.remove_order(maker_id, Decimal::ZERO);
            }
        }

        if maker_filled {
            book.orders.remove(&maker_id);
            outcome.removed_maker_ids.push(maker_id);
        }

        trace!(
            trade_id = trade.id,
            maker_id,
            taker_id = incoming.id,
            price = %trade.price,
            amount = %trade.amount,
            "fill"
        );
        outcome.trades.push(trade);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderKind, OrderSide, PriceLevel};
    use rust_decimal_macros::dec;

    fn limit_order(
        id: u64,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
        user_id: &str,
    ) -> Order {
        Order::new(
            id,
            "BTC/USDT".to_string(),
            side,
            OrderKind::Limit { price },
            amount,
            user_id.to_string(),
        )
    }

    fn market_order(id: u64, side: OrderSide, amount: Decimal, user_id: &str) -> Order {
        Order::new(
            id,
            "BTC/USDT".to_string(),
            side,
            OrderKind::Market,
            amount,
            user_id.to_string(),
        )
    }

    fn rest(book: &mut OrderBook, order: Order) {
        let price = order.kind.price().expect("resting orders are limit orders");
        book.side_mut(order.side)
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .add_order(order.id, order.remaining);
        book.orders.insert(order.id, order);
    }

    fn setup_book_with_ask(price: Decimal, amount: Decimal) -> OrderBook {
        let mut book = OrderBook::new("BTC/USDT".to_string());
        rest(&mut book, limit_order(1, OrderSide::Sell, price, amount, "seller1"));
        book
    }

    fn setup_book_with_bid(price: Decimal, amount: Decimal) -> OrderBook {
        let mut book = OrderBook::new("BTC/USDT".to_string());
        rest(&mut book, limit_order(1, OrderSide::Buy, price, amount, "buyer1"));
        book
    }

    #[test]
    fn test_simple_match() {
        let mut book = setup_book_with_ask(dec!(150.00), dec!(100));
        let mut buy = limit_order(2, OrderSide::Buy, dec!(150.00), dec!(50), "buyer1");

        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::Allow, &ids);

        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].amount, dec!(50));
        assert_eq!(outcome.trades[0].price, dec!(150.00));
        assert_eq!(outcome.trades[0].taker_order_id, 2);
        assert_eq!(outcome.trades[0].maker_order_id, 1);
        assert_eq!(outcome.trades[0].taker_side, OrderSide::Buy);
        assert!(buy.is_filled());
    }

    #[test]
    fn test_full_fill_removes_maker_from_book() {
        let mut book = setup_book_with_ask(dec!(150.00), dec!(100));
        let mut buy = limit_order(2, OrderSide::Buy, dec!(150.00), dec!(100), "buyer1");

        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::Allow, &ids);

        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.removed_maker_ids, vec![1]);
        assert!(book.orders.get(&1).is_none());
        assert!(book.asks.is_empty());
    }

    #[test]
    fn test_partial_fill_keeps_maker_at_head() {
        let mut book = setup_book_with_ask(dec!(150.00), dec!(100));
        let mut buy = limit_order(2, OrderSide::Buy, dec!(150.00), dec!(30), "buyer1");

        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::Allow, &ids);

        assert_eq!(outcome.trades.len(), 1);
        let maker = book.orders.get(&1).unwrap();
        assert_eq!(maker.remaining, dec!(70));
        assert_eq!(maker.status, OrderStatus::PartiallyFilled);

        let level = book.asks.get(&dec!(150.00)).unwrap();
        assert_eq!(level.total_quantity, dec!(70));
        assert_eq!(level.orders.front(), Some(&1));
    }

    #[test]
    fn test_sell_order_matching() {
        let mut book = setup_book_with_bid(dec!(150.00), dec!(100));
        let mut sell = limit_order(2, OrderSide::Sell, dec!(150.00), dec!(50), "seller1");

        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut sell, SelfTradePolicy::Allow, &ids);

        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].amount, dec!(50));
        assert!(sell.is_filled());
    }

    #[test]
    fn test_price_improvement_goes_to_maker() {
        let mut book = setup_book_with_ask(dec!(148.00), dec!(100));
        let mut buy = limit_order(2, OrderSide::Buy, dec!(150.00), dec!(50), "buyer1");

        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::Allow, &ids);

        assert_eq!(outcome.trades[0].price, dec!(148.00));
    }

    #[test]
    fn test_no_match_when_prices_dont_cross() {
        let mut book = setup_book_with_ask(dec!(150.00), dec!(100));
        let mut buy = limit_order(2, OrderSide::Buy, dec!(140.00), dec!(50), "buyer1");

        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::Allow, &ids);

        assert!(outcome.trades.is_empty());
        assert!(!buy.is_filled());
        // The resting ask is untouched
        assert_eq!(book.orders.get(&1).unwrap().remaining, dec!(100));
    }

    #[test]
    fn test_time_priority_at_equal_price() {
        // Two bids at 50: id 1 (amount 4) arrived before id 2 (amount 6).
        // An incoming sell for 7 must fill id 1 completely, then 3 of id 2.
        let mut book = OrderBook::new("BTC/USDT".to_string());
        rest(&mut book, limit_order(1, OrderSide::Buy, dec!(50), dec!(4), "buyer1"));
        rest(&mut book, limit_order(2, OrderSide::Buy, dec!(50), dec!(6), "buyer2"));

        let mut sell = limit_order(3, OrderSide::Sell, dec!(50), dec!(7), "seller1");
        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut sell, SelfTradePolicy::Allow, &ids);

        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.trades[0].maker_order_id, 1);
        assert_eq!(outcome.trades[0].amount, dec!(4));
        assert_eq!(outcome.trades[1].maker_order_id, 2);
        assert_eq!(outcome.trades[1].amount, dec!(3));

        assert!(book.orders.get(&1).is_none());
        assert_eq!(book.orders.get(&2).unwrap().remaining, dec!(3));
        assert!(sell.is_filled());
    }

    #[test]
    fn test_best_price_consumed_first() {
        let mut book = OrderBook::new("BTC/USDT".to_string());
        rest(&mut book, limit_order(1, OrderSide::Sell, dec!(102), dec!(5), "seller1"));
        rest(&mut book, limit_order(2, OrderSide::Sell, dec!(100), dec!(5), "seller2"));
        rest(&mut book, limit_order(3, OrderSide::Sell, dec!(101), dec!(5), "seller3"));

        let mut buy = market_order(4, OrderSide::Buy, dec!(12), "buyer1");
        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::Allow, &ids);

        let prices: Vec<Decimal> = outcome.trades.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![dec!(100), dec!(101), dec!(102)]);
        assert!(buy.is_filled());
    }

    #[test]
    fn test_market_order_takes_any_price() {
        let mut book = setup_book_with_ask(dec!(150.00), dec!(5));
        let mut buy = market_order(2, OrderSide::Buy, dec!(3), "buyer1");

        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::Allow, &ids);

        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].price, dec!(150.00));
        assert!(buy.is_filled());
        assert_eq!(book.orders.get(&1).unwrap().remaining, dec!(2));
    }

    #[test]
    fn test_market_order_against_empty_book() {
        let mut book = OrderBook::new("BTC/USDT".to_string());
        let mut buy = market_order(1, OrderSide::Buy, dec!(3), "buyer1");

        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::Allow, &ids);

        assert!(outcome.trades.is_empty());
        assert_eq!(buy.remaining, dec!(3));
    }

    #[test]
    fn test_conservation_across_fills() {
        let mut book = setup_book_with_ask(dec!(150.00), dec!(100));
        let before: Decimal = book.orders.get(&1).unwrap().remaining;

        let mut buy = limit_order(2, OrderSide::Buy, dec!(150.00), dec!(40), "buyer1");
        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::Allow, &ids);

        let traded: Decimal = outcome.trades.iter().map(|t| t.amount).sum();
        let maker_after = book.orders.get(&1).unwrap().remaining;
        assert_eq!(before - maker_after, traded);
        assert_eq!(buy.amount - buy.remaining, traded);
        assert!(maker_after >= Decimal::ZERO);
        assert!(buy.remaining >= Decimal::ZERO);
    }

    #[test]
    fn test_self_trade_allowed_by_default() {
        let mut book = setup_book_with_ask(dec!(100), dec!(5));
        // Same user as the resting ask
        let mut buy = limit_order(2, OrderSide::Buy, dec!(100), dec!(5), "seller1");

        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::default(), &ids);

        assert_eq!(outcome.trades.len(), 1);
        assert!(outcome.cancelled.is_empty());
    }

    #[test]
    fn test_self_trade_cancel_resting() {
        let mut book = OrderBook::new("BTC/USDT".to_string());
        rest(&mut book, limit_order(1, OrderSide::Sell, dec!(100), dec!(5), "user1"));
        rest(&mut book, limit_order(2, OrderSide::Sell, dec!(100), dec!(5), "user2"));

        let mut buy = limit_order(3, OrderSide::Buy, dec!(100), dec!(5), "user1");
        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::CancelResting, &ids);

        // Own order cancelled, matching continued against the next maker
        assert_eq!(outcome.cancelled.len(), 1);
        assert_eq!(outcome.cancelled[0].id, 1);
        assert_eq!(outcome.cancelled[0].status, OrderStatus::Cancelled);
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].maker_order_id, 2);
        assert!(book.orders.get(&1).is_none());
    }

    #[test]
    fn test_self_trade_cancel_incoming() {
        let mut book = setup_book_with_ask(dec!(100), dec!(5));
        let mut buy = limit_order(2, OrderSide::Buy, dec!(100), dec!(5), "seller1");

        let ids = IdSequence::starting_at(1);
        let outcome = match_order(&mut book, &mut buy, SelfTradePolicy::CancelIncoming, &ids);

        assert!(outcome.trades.is_empty());
        assert_eq!(buy.status, OrderStatus::Cancelled);
        // The resting order stays untouched
        assert_eq!(book.orders.get(&1).unwrap().remaining, dec!(5));
    }
}
