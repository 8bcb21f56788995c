//! Single-book reconstructor.
//!
//! Drives one (symbol, tier) book from its snapshot/delta events:
//! - the first event must be a snapshot, deltas before it are dropped
//! - later snapshots resynchronize the book
//! - crossed and locked books are tracked (and retained)
//! - every applied event lands in a checkpointed history for `state_as_of`

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::book::{ApplyOutcome, BookState};
use super::history::BookHistory;
use crate::error::{ReconError, Result};
use crate::types::{BookConsistency, BookEvent, DepthTier, StreamKind, Symbol, Timestamp};

/// Configuration for reconstructor behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructorConfig {
    /// Applied events between full book checkpoints
    pub checkpoint_interval: usize,

    /// Whether to log warnings for consistency issues
    pub log_warnings: bool,
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 64,
            log_warnings: true,
        }
    }
}

impl ReconstructorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the checkpoint interval (0 is treated as 1).
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Enable/disable warning logs.
    pub fn with_logging(mut self, log: bool) -> Self {
        self.log_warnings = log;
        self
    }
}

/// Lifecycle of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookStatus {
    /// No event seen yet
    AwaitingSnapshot,
    /// A delta arrived before any snapshot; deltas are dropped until one does
    Unreliable,
    /// Snapshot applied, deltas flow
    Live,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    /// Sequence number the event was applied as
    pub update_seq: u64,

    /// Snapshot with the same timestamp as the previous snapshot
    pub duplicate_snapshot: bool,

    /// Snapshot that brought an unreliable book back
    pub resynchronized: bool,

    /// Entries the book refused, and consistency afterwards
    pub outcome: ApplyOutcome,
}

/// Statistics for monitoring book health.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructorStats {
    /// Events applied (snapshots + deltas)
    pub events_applied: u64,

    pub snapshots: u64,

    pub deltas: u64,

    /// Deltas dropped for lack of a prior snapshot
    pub dropped_deltas: u64,

    /// Events rejected for going back in time
    pub ordering_rejections: u64,

    /// Snapshots repeating the previous snapshot's timestamp
    pub duplicate_snapshots: u64,

    /// Number of crossed books detected (bid > ask)
    pub crossed_books: u64,

    /// Number of locked books detected (bid == ask)
    pub locked_books: u64,

    /// Levels dropped for negative quantity
    pub negative_levels: u64,

    /// Zero-quantity levels dropped from snapshots
    pub zero_levels_in_snapshot: u64,

    /// Levels dropped because the side total would overflow
    pub overflow_levels: u64,

    /// Last timestamp applied
    pub last_timestamp: Option<Timestamp>,
}

/// Reconstructor for one (symbol, tier) book.
///
/// # Example
/// ```
/// use l2_book_reconstructor::lob::BookReconstructor;
/// use l2_book_reconstructor::types::{BookEvent, DepthTier, PriceLevel, Symbol, Timestamp};
/// use rust_decimal::Decimal;
///
/// let mut book = BookReconstructor::new(Symbol::new("BTC/USD"), DepthTier::Top10);
/// let snapshot = BookEvent::Snapshot {
///     bids: vec![PriceLevel::new(Decimal::from(100), Decimal::from(5))],
///     asks: vec![PriceLevel::new(Decimal::from(101), Decimal::from(4))],
/// };
/// book.apply(Timestamp::from(1), &snapshot).unwrap();
///
/// assert_eq!(book.state().mid_price(), Some(Decimal::new(1005, 1)));
/// ```
#[derive(Debug, Clone)]
pub struct BookReconstructor {
    config: ReconstructorConfig,

    /// Live book
    state: BookState,

    /// Applied events with periodic checkpoints
    history: BookHistory,

    status: BookStatus,

    /// Timestamp of the most recent snapshot
    last_snapshot: Option<Timestamp>,

    stats: ReconstructorStats,
}

impl BookReconstructor {
    /// Create a reconstructor with default configuration.
    pub fn new(symbol: Symbol, tier: DepthTier) -> Self {
        Self::with_config(symbol, tier, ReconstructorConfig::default())
    }

    pub fn with_config(symbol: Symbol, tier: DepthTier, config: ReconstructorConfig) -> Self {
        Self {
            history: BookHistory::new(config.checkpoint_interval),
            config,
            state: BookState::new(symbol, tier),
            status: BookStatus::AwaitingSnapshot,
            last_snapshot: None,
            stats: ReconstructorStats::default(),
        }
    }

    #[inline]
    pub fn symbol(&self) -> &Symbol {
        &self.state.symbol
    }

    #[inline]
    pub fn tier(&self) -> DepthTier {
        self.state.tier
    }

    #[inline]
    pub fn config(&self) -> &ReconstructorConfig {
        &self.config
    }

    #[inline]
    pub fn status(&self) -> BookStatus {
        self.status
    }

    /// True once a snapshot has been applied.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.status == BookStatus::Live
    }

    /// Apply one book event.
    ///
    /// # Errors
    /// - [`ReconError::Ordering`] if `timestamp` is earlier than the last
    ///   applied event; the book is unchanged.
    /// - [`ReconError::MissingSnapshot`] for a delta before any snapshot; the
    ///   delta is dropped and the book marked unreliable.
    pub fn apply(&mut self, timestamp: Timestamp, event: &BookEvent) -> Result<ApplyReport> {
        if let Some(previous) = self.stats.last_timestamp {
            if timestamp < previous {
                self.stats.ordering_rejections += 1;
                return Err(ReconError::Ordering {
                    symbol: self.state.symbol.clone(),
                    stream: StreamKind::Book(self.state.tier),
                    timestamp,
                    previous,
                });
            }
        }

        let mut duplicate_snapshot = false;
        let mut resynchronized = false;

        match event {
            BookEvent::Delta { .. } if self.status != BookStatus::Live => {
                self.status = BookStatus::Unreliable;
                self.stats.dropped_deltas += 1;
                return Err(ReconError::MissingSnapshot {
                    symbol: self.state.symbol.clone(),
                    tier: self.state.tier,
                    timestamp,
                });
            }
            BookEvent::Delta { .. } => {
                self.stats.deltas += 1;
            }
            BookEvent::Snapshot { .. } => {
                duplicate_snapshot = self.last_snapshot == Some(timestamp);
                if duplicate_snapshot {
                    self.stats.duplicate_snapshots += 1;
                }
                if self.status == BookStatus::Unreliable {
                    resynchronized = true;
                    log::debug!(
                        "Book {} tier {} resynchronized at {} after {} dropped deltas",
                        self.state.symbol,
                        self.state.tier,
                        timestamp,
                        self.stats.dropped_deltas
                    );
                }
                self.status = BookStatus::Live;
                self.last_snapshot = Some(timestamp);
                self.stats.snapshots += 1;
            }
        }

        let outcome = self.state.apply(timestamp, event);
        self.history.record(&self.state, event);

        self.stats.events_applied += 1;
        self.stats.last_timestamp = Some(timestamp);
        self.stats.negative_levels += outcome.negative.len() as u64;
        self.stats.zero_levels_in_snapshot += outcome.zero_in_snapshot.len() as u64;
        self.stats.overflow_levels += outcome.overflow.len() as u64;
        self.track_consistency(outcome.consistency);

        Ok(ApplyReport {
            update_seq: self.state.update_seq,
            duplicate_snapshot,
            resynchronized,
            outcome,
        })
    }

    /// Track consistency in statistics and optionally log.
    #[inline]
    fn track_consistency(&mut self, consistency: BookConsistency) {
        match consistency {
            BookConsistency::Crossed => {
                self.stats.crossed_books += 1;
                if self.config.log_warnings {
                    if let (Some(bid), Some(ask)) =
                        (self.state.bids.best_price(), self.state.asks.best_price())
                    {
                        log::warn!(
                            "Crossed book {} tier {}: bid={} > ask={} (seq #{})",
                            self.state.symbol,
                            self.state.tier,
                            bid,
                            ask,
                            self.state.update_seq
                        );
                    }
                }
            }
            BookConsistency::Locked => {
                self.stats.locked_books += 1;
                if self.config.log_warnings {
                    if let Some(bid) = self.state.bids.best_price() {
                        log::debug!(
                            "Locked book {} tier {}: bid=ask={} (seq #{})",
                            self.state.symbol,
                            self.state.tier,
                            bid,
                            self.state.update_seq
                        );
                    }
                }
            }
            BookConsistency::Valid | BookConsistency::Empty => {}
        }
    }

    /// Live book, including metadata. Empty with `update_seq == 0` until the
    /// first snapshot.
    #[inline]
    pub fn state(&self) -> &BookState {
        &self.state
    }

    /// Live book if any event has been applied.
    #[inline]
    pub fn current(&self) -> Option<&BookState> {
        (self.state.update_seq > 0).then_some(&self.state)
    }

    /// Book as of `at`: the state with the greatest timestamp ≤ `at`, or
    /// `None` if no event had been applied by then.
    pub fn state_as_of(&self, at: Timestamp) -> Option<Cow<'_, BookState>> {
        self.history.state_as_of(at, &self.state)
    }

    /// Get current statistics.
    pub fn stats(&self) -> &ReconstructorStats {
        &self.stats
    }

    /// Events retained for point-in-time queries.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Reset the book to empty, forgetting its history.
    pub fn reset(&mut self) {
        self.state = BookState::new(self.state.symbol.clone(), self.state.tier);
        self.history.clear();
        self.status = BookStatus::AwaitingSnapshot;
        self.last_snapshot = None;
        self.stats = ReconstructorStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceLevel;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn lvl(price: Decimal, quantity: Decimal) -> PriceLevel {
        PriceLevel::new(price, quantity)
    }

    fn quiet() -> BookReconstructor {
        BookReconstructor::with_config(
            Symbol::new("BTC/USD"),
            DepthTier::Top10,
            ReconstructorConfig::default()
                .with_checkpoint_interval(2)
                .with_logging(false),
        )
    }

    fn snapshot() -> BookEvent {
        BookEvent::Snapshot {
            bids: vec![lvl(dec!(100), dec!(5)), lvl(dec!(99), dec!(3))],
            asks: vec![lvl(dec!(101), dec!(4))],
        }
    }

    fn bid_delta(price: Decimal, quantity: Decimal) -> BookEvent {
        BookEvent::Delta {
            bids: vec![lvl(price, quantity)],
            asks: vec![],
        }
    }

    #[test]
    fn test_new_book() {
        let book = quiet();
        assert_eq!(book.status(), BookStatus::AwaitingSnapshot);
        assert!(book.current().is_none());
        assert!(book.state_as_of(Timestamp::from(100)).is_none());
    }

    #[test]
    fn test_snapshot_then_delta() {
        let mut book = quiet();
        let report = book.apply(Timestamp::from(1), &snapshot()).unwrap();
        assert_eq!(report.update_seq, 1);
        assert!(book.is_live());

        let report = book.apply(Timestamp::from(2), &bid_delta(dec!(100), dec!(0))).unwrap();
        assert_eq!(report.update_seq, 2);
        assert_eq!(book.state().best_bid(), Some(lvl(dec!(99), dec!(3))));
        assert_eq!(book.stats().events_applied, 2);
    }

    #[test]
    fn test_delta_before_snapshot_is_dropped() {
        let mut book = quiet();
        let err = book
            .apply(Timestamp::from(1), &bid_delta(dec!(100), dec!(1)))
            .unwrap_err();
        assert!(matches!(err, ReconError::MissingSnapshot { .. }));
        assert_eq!(book.status(), BookStatus::Unreliable);

        // still dropped until a snapshot
        assert!(book.apply(Timestamp::from(2), &bid_delta(dec!(100), dec!(1))).is_err());
        assert_eq!(book.stats().dropped_deltas, 2);
        assert!(book.current().is_none());

        let report = book.apply(Timestamp::from(3), &snapshot()).unwrap();
        assert!(report.resynchronized);
        assert_eq!(report.update_seq, 1);
        assert!(book.apply(Timestamp::from(4), &bid_delta(dec!(98), dec!(1))).is_ok());
    }

    #[test]
    fn test_regression_rejected_without_change() {
        let mut book = quiet();
        book.apply(Timestamp::from(20), &snapshot()).unwrap();
        let before = book.state().clone();

        let err = book
            .apply(Timestamp::from(15), &bid_delta(dec!(100), dec!(0)))
            .unwrap_err();
        assert!(matches!(err, ReconError::Ordering { .. }));
        assert_eq!(book.state(), &before);
        assert_eq!(book.stats().ordering_rejections, 1);
    }

    #[test]
    fn test_duplicate_snapshot_flagged_and_idempotent() {
        let mut book = quiet();
        book.apply(Timestamp::from(5), &snapshot()).unwrap();
        let once = book.state().clone();

        let report = book.apply(Timestamp::from(5), &snapshot()).unwrap();
        assert!(report.duplicate_snapshot);
        assert!(book.state().same_levels(&once));
        assert_eq!(book.stats().duplicate_snapshots, 1);

        let report = book.apply(Timestamp::from(6), &snapshot()).unwrap();
        assert!(!report.duplicate_snapshot);
    }

    #[test]
    fn test_crossed_book_counted() {
        let mut book = quiet();
        book.apply(Timestamp::from(1), &snapshot()).unwrap();
        let report = book.apply(Timestamp::from(2), &bid_delta(dec!(102), dec!(1))).unwrap();
        assert_eq!(report.outcome.consistency, BookConsistency::Crossed);
        assert_eq!(book.stats().crossed_books, 1);

        let report = book.apply(Timestamp::from(3), &bid_delta(dec!(102), dec!(0))).unwrap();
        assert_eq!(report.outcome.consistency, BookConsistency::Valid);
        let report = book.apply(Timestamp::from(4), &bid_delta(dec!(101), dec!(1))).unwrap();
        assert_eq!(report.outcome.consistency, BookConsistency::Locked);
        assert_eq!(book.stats().locked_books, 1);
    }

    #[test]
    fn test_state_as_of_walks_history() {
        let mut book = quiet();
        book.apply(Timestamp::from(10), &snapshot()).unwrap();
        book.apply(Timestamp::from(20), &bid_delta(dec!(100), dec!(0))).unwrap();
        book.apply(Timestamp::from(30), &bid_delta(dec!(99), dec!(0))).unwrap();

        assert!(book.state_as_of(Timestamp::from(9)).is_none());
        let at_15 = book.state_as_of(Timestamp::from(15)).unwrap();
        assert_eq!(at_15.best_bid(), Some(lvl(dec!(100), dec!(5))));
        let at_25 = book.state_as_of(Timestamp::from(25)).unwrap();
        assert_eq!(at_25.best_bid(), Some(lvl(dec!(99), dec!(3))));
        assert_eq!(at_25.update_seq, 2);
        let latest = book.state_as_of(Timestamp::from(99)).unwrap();
        assert_eq!(latest.best_bid(), None);
    }

    #[test]
    fn test_reset() {
        let mut book = quiet();
        book.apply(Timestamp::from(10), &snapshot()).unwrap();
        book.reset();
        assert_eq!(book.status(), BookStatus::AwaitingSnapshot);
        assert_eq!(book.history_len(), 0);
        assert!(book.current().is_none());
    }
}
