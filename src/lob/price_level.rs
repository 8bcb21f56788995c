//! One side of a price-level book with cached aggregate quantity.
//!
//! This module provides a `BookSide` struct that maps price → quantity for
//! either bids or asks and maintains a cached total quantity for O(1)
//! aggregate queries.
//!
//! # Invariant
//!
//! - No zero (or negative) quantity is ever stored; a level at quantity 0
//!   is absent.
//! - The `total_quantity` field MUST always equal the sum of stored
//!   quantities. This is enforced through encapsulated mutation methods and
//!   verified in debug builds via `verify_invariant()`.
//!
//! Ordering comes from the `BTreeMap` key order: bids are read back to
//! front (highest first), asks front to back (lowest first).
//!
//! # Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | `set_level` | O(log n) |
//! | `best` | O(log n) |
//! | `total_quantity` | O(1) |
//! | `apply_snapshot` | O(m log m) |

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{PriceLevel, Side};

/// Outcome of applying one (price, quantity) pair to a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    /// New price inserted
    Inserted,
    /// Existing price overwritten
    Updated,
    /// Existing price removed (quantity 0)
    Removed,
    /// Quantity 0 for a price the side never held
    Ignored,
    /// Negative quantity, not applied
    Rejected,
    /// Side total would leave the representable range, not applied
    Overflow,
}

/// One side of a price-level book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSide {
    side: Side,
    /// price → quantity, always > 0
    levels: BTreeMap<Decimal, Decimal>,
    /// Cached total (invariant: == levels.values().sum())
    total_quantity: Decimal,
}

impl BookSide {
    /// Create a new empty side.
    #[inline]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            total_quantity: Decimal::ZERO,
        }
    }

    /// Which side of the book this is.
    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Set the aggregate quantity at `price`.
    ///
    /// Quantity > 0 inserts or overwrites, quantity 0 removes the level if
    /// present and is otherwise a no-op. Negative quantities are rejected
    /// and leave the side untouched, as does any update whose new side
    /// total would not fit in a `Decimal`.
    #[inline]
    pub fn set_level(&mut self, price: Decimal, quantity: Decimal) -> LevelChange {
        let change = if quantity.is_sign_negative() && !quantity.is_zero() {
            LevelChange::Rejected
        } else if quantity.is_zero() {
            match self.levels.remove(&price) {
                Some(old) => {
                    self.total_quantity -= old;
                    LevelChange::Removed
                }
                None => LevelChange::Ignored,
            }
        } else {
            let old = self.levels.get(&price).copied();
            // total >= old, so only the add can fail
            let new_total = match old {
                Some(old) => (self.total_quantity - old).checked_add(quantity),
                None => self.total_quantity.checked_add(quantity),
            };
            match new_total {
                None => LevelChange::Overflow,
                Some(total) => {
                    self.levels.insert(price, quantity);
                    self.total_quantity = total;
                    if old.is_some() {
                        LevelChange::Updated
                    } else {
                        LevelChange::Inserted
                    }
                }
            }
        };

        #[cfg(debug_assertions)]
        self.verify_invariant();

        change
    }

    /// Replace every level with `levels`, keeping only positive quantities.
    ///
    /// Returns the entries that were skipped (zero or negative quantity, or
    /// a total overflow) so the caller can report them.
    pub fn apply_snapshot(&mut self, levels: &[PriceLevel]) -> Vec<PriceLevel> {
        self.clear();
        let mut skipped = Vec::new();
        for level in levels {
            if level.quantity <= Decimal::ZERO
                || self.set_level(level.price, level.quantity) == LevelChange::Overflow
            {
                skipped.push(*level);
            }
        }
        skipped
    }

    /// Apply upserts/removals in input order.
    ///
    /// Returns the entries rejected for negative quantity or total overflow.
    pub fn apply_delta(&mut self, levels: &[PriceLevel]) -> Vec<PriceLevel> {
        let mut rejected = Vec::new();
        for level in levels {
            if matches!(
                self.set_level(level.price, level.quantity),
                LevelChange::Rejected | LevelChange::Overflow
            ) {
                rejected.push(*level);
            }
        }
        rejected
    }

    /// Top-of-book level for this side.
    #[inline]
    pub fn best(&self) -> Option<PriceLevel> {
        let entry = match self.side {
            Side::Bid => self.levels.iter().next_back(),
            Side::Ask => self.levels.iter().next(),
        };
        entry.map(|(&price, &quantity)| PriceLevel::new(price, quantity))
    }

    /// Best price only.
    #[inline]
    pub fn best_price(&self) -> Option<Decimal> {
        self.best().map(|level| level.price)
    }

    /// Quantity resting at exactly `price`.
    #[inline]
    pub fn quantity_at(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&price).copied()
    }

    /// Levels best-first.
    pub fn iter(&self) -> Box<dyn Iterator<Item = PriceLevel> + '_> {
        let map = |(&price, &quantity): (&Decimal, &Decimal)| PriceLevel::new(price, quantity);
        match self.side {
            Side::Bid => Box::new(self.levels.iter().rev().map(map)),
            Side::Ask => Box::new(self.levels.iter().map(map)),
        }
    }

    /// Top `n` levels, best-first.
    pub fn best_n(&self, n: usize) -> Vec<PriceLevel> {
        self.iter().take(n).collect()
    }

    /// Σ price × quantity over levels at or better than `price`.
    ///
    /// Better means higher-or-equal for bids and lower-or-equal for asks.
    /// `None` when the sum does not fit in a `Decimal`.
    pub fn notional_ahead(&self, price: Decimal) -> Option<Decimal> {
        let mut range: Box<dyn Iterator<Item = (&Decimal, &Decimal)> + '_> = match self.side {
            Side::Bid => Box::new(self.levels.range(price..)),
            Side::Ask => Box::new(self.levels.range(..=price)),
        };
        range.try_fold(Decimal::ZERO, |acc, (p, q)| acc.checked_add(p.checked_mul(*q)?))
    }

    /// Get the cached total quantity (O(1)).
    #[inline]
    pub fn total_quantity(&self) -> Decimal {
        self.total_quantity
    }

    /// Number of price levels.
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Check if the side has no levels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Remove every level.
    #[inline]
    pub fn clear(&mut self) {
        self.levels.clear();
        self.total_quantity = Decimal::ZERO;
    }

    /// Compute the actual total by summing all levels (O(n)).
    #[inline]
    pub fn compute_actual_total(&self) -> Decimal {
        self.levels.values().copied().sum()
    }

    /// Verify the stored-level invariants hold.
    #[cfg(debug_assertions)]
    #[inline]
    pub fn verify_invariant(&self) {
        debug_assert_eq!(
            self.compute_actual_total(),
            self.total_quantity,
            "BookSide invariant violated: cached total drifted"
        );
        debug_assert!(
            self.levels.values().all(|q| *q > Decimal::ZERO),
            "BookSide invariant violated: non-positive quantity stored"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    pub fn verify_invariant(&self) {}
}
