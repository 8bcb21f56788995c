//! Book analytics.
//!
//! Read-only queries over a reconstructed book. Nothing here touches engine
//! state: simulations run on a copy.
//!
//! # Key Features
//!
//! - **DepthStats**: Per-side statistics (quantity, VWAP, level distribution)
//! - **simulate_limit_order**: What a limit order would fill and where its
//!   residual would rest
//!
//! # Usage
//!
//! ```
//! use l2_book_reconstructor::analytics::{simulate_limit_order, DepthStats};
//! use l2_book_reconstructor::lob::BookState;
//! use l2_book_reconstructor::types::*;
//! use rust_decimal::Decimal;
//!
//! let mut book = BookState::new(Symbol::new("BTC/USD"), DepthTier::Top10);
//! book.apply(
//!     Timestamp::from(1),
//!     &BookEvent::Snapshot {
//!         bids: vec![PriceLevel::new(Decimal::from(100), Decimal::from(5))],
//!         asks: vec![PriceLevel::new(Decimal::from(101), Decimal::from(4))],
//!     },
//! );
//!
//! let asks = DepthStats::from_side(&book.asks);
//! assert_eq!(asks.total_quantity, Decimal::from(4));
//!
//! let sim = simulate_limit_order(&book, Side::Bid, Decimal::from(101), Decimal::from(6), 10);
//! assert_eq!(sim.filled, Decimal::from(4));
//! assert_eq!(sim.rested, Decimal::from(2));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::lob::{BookSide, BookState, DepthView, LevelChange};
use crate::types::{PriceLevel, Side};

// ============================================================================
// Depth Statistics
// ============================================================================

/// Statistics for one side of the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthStats {
    /// Which side of the book (Bid or Ask)
    pub side: Side,

    /// Total quantity across all levels, saturating at `Decimal::MAX`
    pub total_quantity: Decimal,

    /// Total price × quantity across all levels, `None` when out of range
    pub total_notional: Option<Decimal>,

    /// Number of price levels
    pub levels_count: usize,

    /// Average quantity per level
    pub avg_level_quantity: Decimal,

    /// Volume-weighted average price (VWAP)
    pub weighted_avg_price: Option<Decimal>,

    /// Smallest level quantity
    pub min_level_quantity: Option<Decimal>,

    /// Largest level quantity
    pub max_level_quantity: Option<Decimal>,

    /// Best price on this side
    pub best_price: Option<Decimal>,

    /// Worst price on this side (furthest from the touch)
    pub worst_price: Option<Decimal>,

    /// |worst − best|
    pub price_range: Decimal,

    /// Quantity at the best level / total quantity
    pub concentration_ratio: Option<Decimal>,
}

impl DepthStats {
    /// Create empty depth statistics.
    pub fn empty(side: Side) -> Self {
        Self {
            side,
            total_quantity: Decimal::ZERO,
            total_notional: Some(Decimal::ZERO),
            levels_count: 0,
            avg_level_quantity: Decimal::ZERO,
            weighted_avg_price: None,
            min_level_quantity: None,
            max_level_quantity: None,
            best_price: None,
            worst_price: None,
            price_range: Decimal::ZERO,
            concentration_ratio: None,
        }
    }

    /// Compute statistics over every level of `side`.
    pub fn from_side(side: &BookSide) -> Self {
        Self::from_levels(side.side(), side.iter())
    }

    /// Compute statistics over the top `n` levels of `side`.
    pub fn from_side_top(side: &BookSide, n: usize) -> Self {
        Self::from_levels(side.side(), side.iter().take(n))
    }

    /// Compute statistics over levels given best-first.
    pub fn from_levels(side: Side, levels: impl IntoIterator<Item = PriceLevel>) -> Self {
        let mut stats = Self::empty(side);
        let mut best_quantity = None;

        for level in levels {
            if level.quantity <= Decimal::ZERO {
                continue;
            }
            if stats.best_price.is_none() {
                stats.best_price = Some(level.price);
                best_quantity = Some(level.quantity);
            }
            stats.worst_price = Some(level.price);
            stats.levels_count += 1;
            stats.total_quantity = stats.total_quantity.saturating_add(level.quantity);
            stats.total_notional = stats
                .total_notional
                .and_then(|total| total.checked_add(level.notional()?));
            stats.min_level_quantity = Some(
                stats
                    .min_level_quantity
                    .map_or(level.quantity, |q| q.min(level.quantity)),
            );
            stats.max_level_quantity = Some(
                stats
                    .max_level_quantity
                    .map_or(level.quantity, |q| q.max(level.quantity)),
            );
        }

        if stats.levels_count == 0 {
            return stats;
        }

        stats.avg_level_quantity = stats.total_quantity / Decimal::from(stats.levels_count as u64);
        stats.weighted_avg_price = stats
            .total_notional
            .and_then(|notional| notional.checked_div(stats.total_quantity));
        if let (Some(best), Some(worst)) = (stats.best_price, stats.worst_price) {
            stats.price_range = worst.saturating_sub(best).abs();
        }
        stats.concentration_ratio = best_quantity.and_then(|q| q.checked_div(stats.total_quantity));
        stats
    }

    /// Check if statistics represent an empty side.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels_count == 0
    }
}

// ============================================================================
// Limit Order Simulation
// ============================================================================

/// Outcome of a simulated limit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderSimulation {
    /// Book side the order joins (Bid = buy)
    pub side: Side,

    pub price: Decimal,

    pub requested: Decimal,

    /// Fills against the opposite side, best-first
    pub fills: Vec<PriceLevel>,

    /// Quantity crossed
    pub filled: Decimal,

    /// Quantity left resting at `price`
    pub rested: Decimal,

    /// Residual that could not rest because the level or side total would
    /// leave `Decimal` range
    pub unplaced: Decimal,

    /// Top levels of the book after the order
    pub top: DepthView,

    /// Full book after the order
    pub book_after: BookState,
}

impl LimitOrderSimulation {
    /// Σ fill price × quantity, `None` when out of range.
    pub fn filled_notional(&self) -> Option<Decimal> {
        self.fills
            .iter()
            .try_fold(Decimal::ZERO, |acc, fill| acc.checked_add(fill.notional()?))
    }

    /// Average fill price, if anything filled.
    pub fn avg_fill_price(&self) -> Option<Decimal> {
        self.filled_notional()?.checked_div(self.filled)
    }

    /// The whole order crossed.
    #[inline]
    pub fn fully_filled(&self) -> bool {
        self.rested.is_zero() && self.unplaced.is_zero() && !self.filled.is_zero()
    }
}

/// Simulate a limit order on a copy of `book`.
///
/// Marketable quantity crosses the opposite side best-first while its best
/// price is at or through `price`. Any residual rests at `price` on `side`,
/// adding to quantity already there. A quantity ≤ 0 leaves the book as is.
pub fn simulate_limit_order(
    book: &BookState,
    side: Side,
    price: Decimal,
    quantity: Decimal,
    top_n: usize,
) -> LimitOrderSimulation {
    let mut after = book.clone();
    let mut fills = Vec::new();
    let mut remaining = quantity.max(Decimal::ZERO);

    {
        let opposite = match side {
            Side::Bid => &mut after.asks,
            Side::Ask => &mut after.bids,
        };
        while remaining > Decimal::ZERO {
            let best = match opposite.best() {
                Some(best) if marketable(side, price, best.price) => best,
                _ => break,
            };
            let take = remaining.min(best.quantity);
            opposite.set_level(best.price, best.quantity - take);
            fills.push(PriceLevel::new(best.price, take));
            remaining -= take;
        }
    }

    let mut unplaced = Decimal::ZERO;
    if remaining > Decimal::ZERO {
        let own = match side {
            Side::Bid => &mut after.bids,
            Side::Ask => &mut after.asks,
        };
        let existing = own.quantity_at(price).unwrap_or(Decimal::ZERO);
        let placed = existing
            .checked_add(remaining)
            .map(|total| own.set_level(price, total));
        if matches!(placed, None | Some(LevelChange::Overflow)) {
            unplaced = remaining;
            remaining = Decimal::ZERO;
        }
    }

    let filled = fills.iter().map(|f| f.quantity).sum();
    LimitOrderSimulation {
        side,
        price,
        requested: quantity,
        fills,
        filled,
        rested: remaining,
        unplaced,
        top: after.top_n(top_n),
        book_after: after,
    }
}

/// A buy crosses asks at or below its limit, a sell bids at or above.
#[inline]
fn marketable(side: Side, limit: Decimal, resting: Decimal) -> bool {
    match side {
        Side::Bid => resting <= limit,
        Side::Ask => resting >= limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookEvent, DepthTier, Symbol, Timestamp};
    use rust_decimal_macros::dec;

    fn create_test_book() -> BookState {
        let mut book = BookState::new(Symbol::new("BTC/USD"), DepthTier::Top10);
        book.apply(
            Timestamp::from(1),
            &BookEvent::Snapshot {
                bids: vec![
                    PriceLevel::new(dec!(100.00), dec!(1)),
                    PriceLevel::new(dec!(99.99), dec!(2)),
                    PriceLevel::new(dec!(99.98), dec!(1.5)),
                ],
                asks: vec![
                    PriceLevel::new(dec!(100.01), dec!(1.5)),
                    PriceLevel::new(dec!(100.02), dec!(1)),
                    PriceLevel::new(dec!(100.03), dec!(2)),
                ],
            },
        );
        book
    }

    #[test]
    fn test_depth_stats_from_side() {
        let book = create_test_book();
        let stats = DepthStats::from_side(&book.bids);
        assert_eq!(stats.total_quantity, dec!(4.5));
        assert_eq!(stats.levels_count, 3);
        assert_eq!(stats.best_price, Some(dec!(100.00)));
        assert_eq!(stats.worst_price, Some(dec!(99.98)));
        assert_eq!(stats.price_range, dec!(0.02));
        assert_eq!(stats.max_level_quantity, Some(dec!(2)));
        assert_eq!(stats.min_level_quantity, Some(dec!(1)));
        // (100 + 199.98 + 149.97) / 4.5
        assert_eq!(stats.weighted_avg_price, Some(dec!(449.95) / dec!(4.5)));
    }

    #[test]
    fn test_depth_stats_top_and_empty() {
        let book = create_test_book();
        let top = DepthStats::from_side_top(&book.asks, 1);
        assert_eq!(top.levels_count, 1);
        assert_eq!(top.concentration_ratio, Some(dec!(1)));

        let empty = BookSide::new(Side::Ask);
        assert!(DepthStats::from_side(&empty).is_empty());
        assert_eq!(DepthStats::from_side(&empty).weighted_avg_price, None);
    }

    #[test]
    fn test_buy_crosses_then_rests() {
        let book = create_test_book();
        let sim = simulate_limit_order(&book, Side::Bid, dec!(100.02), dec!(3), 10);

        assert_eq!(
            sim.fills,
            vec![
                PriceLevel::new(dec!(100.01), dec!(1.5)),
                PriceLevel::new(dec!(100.02), dec!(1)),
            ]
        );
        assert_eq!(sim.filled, dec!(2.5));
        assert_eq!(sim.rested, dec!(0.5));
        assert_eq!(sim.top.bids[0], PriceLevel::new(dec!(100.02), dec!(0.5)));
        assert_eq!(sim.top.asks[0], PriceLevel::new(dec!(100.03), dec!(2)));
        // source book untouched
        assert_eq!(book.best_ask(), Some(PriceLevel::new(dec!(100.01), dec!(1.5))));
    }

    #[test]
    fn test_sell_partial_level_fill() {
        let book = create_test_book();
        let sim = simulate_limit_order(&book, Side::Ask, dec!(99.99), dec!(2), 10);
        assert_eq!(sim.filled, dec!(2));
        assert!(sim.fully_filled());
        assert_eq!(sim.book_after.bids.quantity_at(dec!(99.99)), Some(dec!(1)));
        assert_eq!(sim.book_after.bids.quantity_at(dec!(100.00)), None);
        assert_eq!(sim.avg_fill_price(), Some(dec!(199.99) / dec!(2)));
    }

    #[test]
    fn test_passive_order_adds_to_level() {
        let book = create_test_book();
        let sim = simulate_limit_order(&book, Side::Bid, dec!(99.99), dec!(0.5), 10);
        assert!(sim.fills.is_empty());
        assert_eq!(sim.book_after.bids.quantity_at(dec!(99.99)), Some(dec!(2.5)));
    }

    #[test]
    fn test_residual_out_of_range_is_unplaced() {
        let huge = Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0);
        let mut book = BookState::new(Symbol::new("BTC/USD"), DepthTier::Top10);
        book.apply(
            Timestamp::from(1),
            &BookEvent::Snapshot {
                bids: vec![PriceLevel::new(dec!(100), huge)],
                asks: vec![PriceLevel::new(dec!(101), dec!(1))],
            },
        );

        let sim = simulate_limit_order(&book, Side::Bid, dec!(99), huge, 10);
        assert_eq!(sim.rested, Decimal::ZERO);
        assert_eq!(sim.unplaced, huge);
        assert!(!sim.fully_filled());
        assert!(sim.book_after.same_levels(&book));

        let stats = DepthStats::from_side(&book.bids);
        assert_eq!(stats.total_quantity, huge);
        assert_eq!(stats.total_notional, None);
        assert_eq!(stats.weighted_avg_price, None);
    }

    #[test]
    fn test_non_positive_quantity_is_noop() {
        let book = create_test_book();
        let sim = simulate_limit_order(&book, Side::Bid, dec!(200), dec!(0), 10);
        assert!(sim.book_after.same_levels(&book));
        let sim = simulate_limit_order(&book, Side::Ask, dec!(1), dec!(-3), 10);
        assert!(sim.book_after.same_levels(&book));
        assert_eq!(sim.avg_fill_price(), None);
    }
}
