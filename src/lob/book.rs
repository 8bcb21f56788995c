//! Two-sided book state for one (symbol, tier).
//!
//! `BookState` is what the reconstructor mutates and what point-in-time
//! queries hand back. It carries the metadata needed to place it in time
//! (`timestamp`, `update_seq`) next to both `BookSide`s.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::price_level::BookSide;
use crate::types::{
    BookConsistency, BookEvent, DepthTier, PriceLevel, Side, Symbol, Timestamp,
};

/// Basis points per unit.
pub(crate) const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Entries an event carried that the book refused to store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    /// Zero-quantity entries inside a snapshot
    pub zero_in_snapshot: Vec<(Side, PriceLevel)>,
    /// Negative-quantity entries (snapshot or delta)
    pub negative: Vec<(Side, PriceLevel)>,
    /// Entries that would push a side total out of `Decimal` range
    pub overflow: Vec<(Side, PriceLevel)>,
    /// Consistency after the event
    pub consistency: BookConsistency,
}

impl ApplyOutcome {
    fn classify(&mut self, side: Side, level: PriceLevel) {
        if level.quantity.is_zero() {
            self.zero_in_snapshot.push((side, level));
        } else if level.quantity.is_sign_negative() {
            self.negative.push((side, level));
        } else {
            self.overflow.push((side, level));
        }
    }
}

/// Book state at one point of a (symbol, tier) lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookState {
    pub symbol: Symbol,
    pub tier: DepthTier,
    /// Timestamp of the last applied event
    pub timestamp: Timestamp,
    /// Number of events applied so far (1 after the first snapshot)
    pub update_seq: u64,
    pub bids: BookSide,
    pub asks: BookSide,
}

impl BookState {
    /// Create an empty book that has not applied any event yet.
    pub fn new(symbol: Symbol, tier: DepthTier) -> Self {
        Self {
            symbol,
            tier,
            timestamp: Timestamp::default(),
            update_seq: 0,
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
        }
    }

    /// Apply one event, stamping the state with `timestamp` and bumping
    /// `update_seq`.
    pub fn apply(&mut self, timestamp: Timestamp, event: &BookEvent) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        match event {
            BookEvent::Snapshot { bids, asks } => {
                for (side, book_side, levels) in [
                    (Side::Bid, &mut self.bids, bids),
                    (Side::Ask, &mut self.asks, asks),
                ] {
                    for skipped in book_side.apply_snapshot(levels) {
                        outcome.classify(side, skipped);
                    }
                }
            }
            BookEvent::Delta { bids, asks } => {
                for (side, book_side, levels) in [
                    (Side::Bid, &mut self.bids, bids),
                    (Side::Ask, &mut self.asks, asks),
                ] {
                    for rejected in book_side.apply_delta(levels) {
                        outcome.classify(side, rejected);
                    }
                }
            }
        }

        self.timestamp = timestamp;
        self.update_seq += 1;
        outcome.consistency = self.consistency();
        outcome
    }

    /// Borrow one side.
    #[inline]
    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    #[inline]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.best()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.best()
    }

    /// Check book consistency (whether bid < ask).
    #[inline]
    pub fn consistency(&self) -> BookConsistency {
        BookConsistency::classify(self.bids.best_price(), self.asks.best_price())
    }

    /// Best bid ≥ best ask.
    #[inline]
    pub fn is_crossed(&self) -> bool {
        self.consistency().is_crossed_or_locked()
    }

    /// (best_bid + best_ask) / 2 when both sides are present and the sum
    /// fits in a `Decimal`.
    #[inline]
    pub fn mid_price(&self) -> Option<Decimal> {
        let (bid, ask) = (self.bids.best_price()?, self.asks.best_price()?);
        bid.checked_add(ask).map(|sum| sum / Decimal::TWO)
    }

    /// best_ask − best_bid when both sides are present.
    #[inline]
    pub fn spread(&self) -> Option<Decimal> {
        let (bid, ask) = (self.bids.best_price()?, self.asks.best_price()?);
        ask.checked_sub(bid)
    }

    /// Spread relative to mid, in basis points.
    pub fn spread_bps(&self) -> Option<Decimal> {
        match (self.spread(), self.mid_price()) {
            (Some(spread), Some(mid)) if mid > Decimal::ZERO => {
                spread.checked_div(mid)?.checked_mul(BPS)
            }
            _ => None,
        }
    }

    /// Σ price × quantity at or better than `price` on `side`.
    pub fn notional_ahead(&self, side: Side, price: Decimal) -> Option<Decimal> {
        self.side(side).notional_ahead(price)
    }

    /// Top `n` levels of each side.
    pub fn top_n(&self, n: usize) -> DepthView {
        DepthView {
            bids: self.bids.best_n(n),
            asks: self.asks.best_n(n),
        }
    }

    /// Same levels on both sides, ignoring metadata.
    pub fn same_levels(&self, other: &BookState) -> bool {
        self.bids == other.bids && self.asks == other.asks
    }
}

/// Top-n view of a book, best-first on each side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthView {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}
