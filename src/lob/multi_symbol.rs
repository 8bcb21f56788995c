//! Multi-book manager.
//!
//! Owns one [`BookReconstructor`] per (symbol, tier), creating books as
//! symbols are discovered in the input, and turns every refused row or
//! suspicious state into an anomaly.

use std::borrow::Cow;
use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::book::BookState;
use super::reconstructor::{BookReconstructor, ReconstructorConfig, ReconstructorStats};
use crate::anomaly::{Anomaly, AnomalyKind, AnomalyReporter};
use crate::error::{ReconError, Result};
use crate::types::{BookUpdate, DepthTier, PriceLevel, Side, Symbol, Timestamp};

/// Statistics across every tracked book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Books created (one per symbol and tier seen)
    pub book_count: usize,

    /// Book updates offered to the engine
    pub total_updates: u64,

    /// Updates applied
    pub applied_updates: u64,

    /// Updates refused (ordering or missing snapshot)
    pub rejected_updates: u64,

    /// Updates per symbol
    pub updates_per_symbol: BTreeMap<Symbol, u64>,
}

/// Reconstruction engine over every (symbol, tier) book.
///
/// # Example
/// ```
/// use l2_book_reconstructor::anomaly::AnomalyReporter;
/// use l2_book_reconstructor::lob::ReconstructionEngine;
/// use l2_book_reconstructor::types::*;
/// use rust_decimal::Decimal;
///
/// let mut engine = ReconstructionEngine::new();
/// let mut anomalies = AnomalyReporter::new();
///
/// let update = BookUpdate {
///     symbol: Symbol::new("ETH/USD"),
///     tier: DepthTier::Top10,
///     timestamp: Timestamp::from(1),
///     event: BookEvent::Snapshot {
///         bids: vec![PriceLevel::new(Decimal::from(99), Decimal::ONE)],
///         asks: vec![PriceLevel::new(Decimal::from(101), Decimal::ONE)],
///     },
/// };
/// engine.apply(&update, None, &mut anomalies);
///
/// let book = engine
///     .state_as_of(&Symbol::new("ETH/USD"), DepthTier::Top10, Timestamp::from(5))
///     .unwrap();
/// assert_eq!(book.mid_price(), Some(Decimal::from(100)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReconstructionEngine {
    config: ReconstructorConfig,

    /// (symbol, tier) -> reconstructor
    books: AHashMap<(Symbol, DepthTier), BookReconstructor>,

    stats: EngineStats,
}

impl ReconstructionEngine {
    /// Create an engine with default reconstructor configuration.
    pub fn new() -> Self {
        Self::with_config(ReconstructorConfig::default())
    }

    /// Create an engine whose books all share `config`.
    pub fn with_config(config: ReconstructorConfig) -> Self {
        Self {
            config,
            books: AHashMap::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &ReconstructorConfig {
        &self.config
    }

    /// Apply a book update, recording anomalies for anything refused or
    /// suspicious.
    ///
    /// `sequence` is the update's position in the merged event sequence,
    /// attached to every anomaly raised here.
    ///
    /// # Returns
    /// The book's `update_seq` after applying, or `None` if the update was
    /// refused.
    pub fn apply(
        &mut self,
        update: &BookUpdate,
        sequence: Option<u64>,
        anomalies: &mut AnomalyReporter,
    ) -> Option<u64> {
        let key = (update.symbol.clone(), update.tier);
        let config = &self.config;
        let stats = &mut self.stats;
        let book = self.books.entry(key).or_insert_with(|| {
            stats.book_count += 1;
            BookReconstructor::with_config(update.symbol.clone(), update.tier, config.clone())
        });

        self.stats.total_updates += 1;
        *self
            .stats
            .updates_per_symbol
            .entry(update.symbol.clone())
            .or_insert(0) += 1;

        let tag = |anomaly: Anomaly| match sequence {
            Some(seq) => anomaly.with_sequence(seq),
            None => anomaly,
        };

        let report = match book.apply(update.timestamp, &update.event) {
            Ok(report) => report,
            Err(err) => {
                self.stats.rejected_updates += 1;
                anomalies.record(tag(Anomaly::from_error(&err)));
                return None;
            }
        };
        self.stats.applied_updates += 1;

        let at = |kind: AnomalyKind, message: String| {
            tag(Anomaly::new(kind, message)
                .with_symbol(update.symbol.clone())
                .with_timestamp(update.timestamp)
                .with_context("tier", update.tier.to_string())
                .with_context("update_seq", report.update_seq.to_string()))
        };

        if report.duplicate_snapshot {
            anomalies.record(at(
                AnomalyKind::DuplicateSnapshot,
                format!(
                    "Snapshot for {} tier {} repeats timestamp {}",
                    update.symbol, update.tier, update.timestamp
                ),
            ));
        }

        for (side, level) in &report.outcome.zero_in_snapshot {
            anomalies.record(level_context(
                at(
                    AnomalyKind::ZeroQuantityInSnapshot,
                    format!("Zero quantity at {} in {:?} snapshot", level.price, side),
                ),
                *side,
                level,
            ));
        }

        for (side, level) in &report.outcome.negative {
            anomalies.record(level_context(
                at(
                    AnomalyKind::NegativeQuantity,
                    format!(
                        "Negative quantity {} at {} on {:?} dropped",
                        level.quantity, level.price, side
                    ),
                ),
                *side,
                level,
            ));
        }

        for (side, level) in &report.outcome.overflow {
            anomalies.record(level_context(
                at(
                    AnomalyKind::QuantityOverflow,
                    format!(
                        "Quantity {} at {} on {:?} dropped: side total out of range",
                        level.quantity, level.price, side
                    ),
                ),
                *side,
                level,
            ));
        }

        if report.outcome.consistency.is_crossed_or_locked() {
            let state = book.state();
            let bid = state.bids.best_price().map(|p| p.to_string()).unwrap_or_default();
            let ask = state.asks.best_price().map(|p| p.to_string()).unwrap_or_default();
            anomalies.record(
                at(
                    AnomalyKind::CrossedBook,
                    format!(
                        "{:?} book {} tier {}: best bid {} >= best ask {}",
                        report.outcome.consistency, update.symbol, update.tier, bid, ask
                    ),
                )
                .with_context("best_bid", bid)
                .with_context("best_ask", ask),
            );
        }

        Some(report.update_seq)
    }

    /// Book as of `at` for (symbol, tier).
    pub fn state_as_of(
        &self,
        symbol: &Symbol,
        tier: DepthTier,
        at: Timestamp,
    ) -> Option<Cow<'_, BookState>> {
        self.book(symbol, tier)?.state_as_of(at)
    }

    /// Reconstructor for (symbol, tier), if the book has been seen.
    pub fn book(&self, symbol: &Symbol, tier: DepthTier) -> Option<&BookReconstructor> {
        // Tuple keys need an owned symbol for lookup.
        self.books.get(&(symbol.clone(), tier))
    }

    /// Live state for (symbol, tier).
    pub fn current(&self, symbol: &Symbol, tier: DepthTier) -> Result<&BookState> {
        self.book(symbol, tier)
            .and_then(BookReconstructor::current)
            .ok_or_else(|| ReconError::BookNotFound(format!("{symbol} tier {tier}")))
    }

    /// Statistics for one book.
    pub fn book_stats(&self, symbol: &Symbol, tier: DepthTier) -> Result<&ReconstructorStats> {
        self.book(symbol, tier)
            .map(BookReconstructor::stats)
            .ok_or_else(|| ReconError::BookNotFound(format!("{symbol} tier {tier}")))
    }

    /// Symbols with at least one book, sorted.
    pub fn symbols(&self) -> Vec<&Symbol> {
        let mut symbols: Vec<&Symbol> = self.books.keys().map(|(s, _)| s).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Number of (symbol, tier) books.
    pub fn book_count(&self) -> usize {
        self.books.len()
    }

    /// Check if a book is being tracked.
    pub fn has_book(&self, symbol: &Symbol, tier: DepthTier) -> bool {
        self.book(symbol, tier).is_some()
    }

    /// Get statistics.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Fold another engine's books in. Used when symbols were replayed on
    /// separate partitions; books for the same key are replaced.
    pub fn absorb(&mut self, other: ReconstructionEngine) {
        for (key, book) in other.books {
            self.books.insert(key, book);
        }
        self.stats.book_count = self.books.len();
        self.stats.total_updates += other.stats.total_updates;
        self.stats.applied_updates += other.stats.applied_updates;
        self.stats.rejected_updates += other.stats.rejected_updates;
        for (symbol, count) in other.stats.updates_per_symbol {
            *self.stats.updates_per_symbol.entry(symbol).or_insert(0) += count;
        }
    }
}

fn level_context(anomaly: Anomaly, side: Side, level: &PriceLevel) -> Anomaly {
    anomaly
        .with_context("side", format!("{side:?}"))
        .with_context("price", level.price.to_string())
        .with_context("quantity", level.quantity.to_string())
}
