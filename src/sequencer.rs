//! Merge of the three feeds into one time-ordered event sequence.
//!
//! # Ordering key
//!
//! Events are ordered by a 4-level key:
//! 1. `timestamp`
//! 2. stream priority: ref, then book, then trade ([`StreamKind::priority`])
//! 3. depth tier (top-10 before top-1000) among book events
//! 4. arrival order
//!
//! # Validation
//!
//! Each (symbol, stream) must be non-decreasing in time, where every book
//! tier is its own stream. A row earlier than the last accepted row of its
//! stream is rejected with an ordering anomaly and never reordered. Book rows
//! are decoded here; a row whose depth list fails to decode is dropped with
//! a decode anomaly and does not count as accepted.

use std::cmp::Ordering;

use ahash::AHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::anomaly::{Anomaly, AnomalyKind, AnomalyReporter};
use crate::depth_list::decode_row_side;
use crate::error::{ReconError, Result};
use crate::rows::{BookRow, FeedRow};
use crate::types::{BookEvent, BookUpdate, DepthTier, MarketEvent, StreamKind, Symbol, Timestamp};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the sequencer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Forward jump within a (symbol, stream) above which a gap anomaly is
    /// recorded, in the feed's timestamp unit. `None` disables gap checks.
    pub gap_threshold: Option<Decimal>,
}

impl SequencerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gap_threshold(mut self, threshold: Decimal) -> Self {
        self.gap_threshold = Some(threshold);
        self
    }
}

// ============================================================================
// Ordering key
// ============================================================================

/// Total order over sequenced events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderingKey {
    pub timestamp: Timestamp,
    pub priority: u8,
    /// 0 for non-book streams
    pub tier_rank: u8,
    pub arrival: u64,
}

impl OrderingKey {
    pub fn new(timestamp: Timestamp, stream: StreamKind, arrival: u64) -> Self {
        let tier_rank = match stream {
            StreamKind::Book(DepthTier::Top10) => 0,
            StreamKind::Book(DepthTier::Top1000) => 1,
            StreamKind::Ref | StreamKind::Trade => 0,
        };
        Self {
            timestamp,
            priority: stream.priority(),
            tier_rank,
            arrival,
        }
    }
}

impl PartialOrd for OrderingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| self.tier_rank.cmp(&other.tier_rank))
            .then_with(|| self.arrival.cmp(&other.arrival))
    }
}

// ============================================================================
// Sequenced output
// ============================================================================

/// An event with its position in the merged sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent {
    /// 0-based position in the merged sequence
    pub seq: u64,
    pub event: MarketEvent,
}

/// Statistics for one sequencing pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequencerStats {
    /// Rows offered
    pub rows_in: u64,
    /// Rows accepted into the sequence
    pub accepted: u64,
    /// Rows refused for going back in time
    pub ordering_rejections: u64,
    /// Book rows whose depth lists failed to decode
    pub decode_failures: u64,
    /// Forward jumps above the gap threshold
    pub gaps: u64,
}

// ============================================================================
// Sequencer
// ============================================================================

/// Collects rows from all feeds and emits them as one ordered sequence.
///
/// # Example
/// ```
/// use l2_book_reconstructor::anomaly::AnomalyReporter;
/// use l2_book_reconstructor::sequencer::Sequencer;
/// use l2_book_reconstructor::types::{RefPrice, Trade};
///
/// let mut anomalies = AnomalyReporter::new();
/// let mut sequencer = Sequencer::new();
///
/// let trade = Trade::from_fields(&["BTC/USD", "buy", "100", "1", "5"]).unwrap();
/// let quote = RefPrice::from_fields(&["BTC/USD", "5", "99", "101"]).unwrap();
/// sequencer.push(trade.into(), &mut anomalies);
/// sequencer.push(quote.into(), &mut anomalies);
///
/// let events = sequencer.finish();
/// // same timestamp: the reference price sorts first
/// assert_eq!(events[0].event.stream().to_string(), "ref");
/// ```
#[derive(Debug, Default)]
pub struct Sequencer {
    config: SequencerConfig,

    /// Accepted events with their ordering keys
    pending: Vec<(OrderingKey, MarketEvent)>,

    /// Last accepted timestamp per (symbol, stream)
    last_seen: AHashMap<(Symbol, StreamKind), Timestamp>,

    next_arrival: u64,

    stats: SequencerStats,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::with_config(SequencerConfig::default())
    }

    pub fn with_config(config: SequencerConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            last_seen: AHashMap::new(),
            next_arrival: 0,
            stats: SequencerStats::default(),
        }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Offer one row, in the order it was read from its feed.
    ///
    /// Returns `true` if the row was accepted.
    pub fn push(&mut self, row: FeedRow, anomalies: &mut AnomalyReporter) -> bool {
        self.stats.rows_in += 1;
        let arrival = self.next_arrival;
        self.next_arrival += 1;

        let timestamp = row.timestamp();
        let stream = row.stream();
        let key = (row.symbol().clone(), stream);

        let previous = self.last_seen.get(&key).copied();
        if let Err(err) = check_order(&key.0, stream, timestamp, previous) {
            self.stats.ordering_rejections += 1;
            log::warn!("{err}");
            anomalies.record_error(&err);
            return false;
        }

        let event = match row {
            FeedRow::Book(book_row) => {
                let book_seen = previous.is_some();
                match decode_book_row(&book_row, book_seen) {
                    Ok(update) => MarketEvent::Book(update),
                    Err(err) => {
                        self.stats.decode_failures += 1;
                        anomalies.record_error(&err);
                        return false;
                    }
                }
            }
            FeedRow::Trade(trade) => MarketEvent::Trade(trade),
            FeedRow::Ref(quote) => MarketEvent::Ref(quote),
        };

        if let (Some(threshold), Some(previous)) = (self.config.gap_threshold, previous) {
            if let Some(gap) = timestamp.checked_since(previous) {
                if gap > threshold {
                    self.stats.gaps += 1;
                    anomalies.record(
                        Anomaly::new(
                            AnomalyKind::TimestampGap,
                            format!(
                                "{} on {}: {} after {} (gap {} > {})",
                                key.0, stream, timestamp, previous, gap, threshold
                            ),
                        )
                        .with_symbol(key.0.clone())
                        .with_timestamp(timestamp)
                        .with_context("stream", stream.to_string())
                        .with_context("previous", previous.to_string())
                        .with_context("gap", gap.to_string()),
                    );
                }
            }
        }

        self.last_seen.insert(key, timestamp);
        self.pending
            .push((OrderingKey::new(timestamp, stream, arrival), event));
        self.stats.accepted += 1;
        true
    }

    /// Offer every row of an iterator.
    pub fn extend<I>(&mut self, rows: I, anomalies: &mut AnomalyReporter)
    where
        I: IntoIterator<Item = FeedRow>,
    {
        for row in rows {
            self.push(row, anomalies);
        }
    }

    /// Sort the accepted events and number them.
    pub fn finish(self) -> Vec<SequencedEvent> {
        let mut pending = self.pending;
        // keys are unique (arrival), so an unstable sort is deterministic
        pending.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        log::debug!(
            "Sequenced {} of {} rows ({} ordering rejections, {} decode failures)",
            self.stats.accepted,
            self.stats.rows_in,
            self.stats.ordering_rejections,
            self.stats.decode_failures
        );

        pending
            .into_iter()
            .enumerate()
            .map(|(seq, (_, event))| SequencedEvent {
                seq: seq as u64,
                event,
            })
            .collect()
    }

    /// Make room for `additional` more rows.
    pub fn reserve(&mut self, additional: usize) {
        self.pending.reserve(additional);
    }

    /// Rows that fit before the pending buffer grows.
    pub fn capacity(&self) -> usize {
        self.pending.capacity()
    }

    /// Number of accepted rows so far.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> &SequencerStats {
        &self.stats
    }
}

/// Reject `timestamp` if it precedes the last accepted row of its stream.
fn check_order(
    symbol: &Symbol,
    stream: StreamKind,
    timestamp: Timestamp,
    previous: Option<Timestamp>,
) -> Result<()> {
    match previous {
        Some(previous) if timestamp < previous => Err(ReconError::Ordering {
            symbol: symbol.clone(),
            stream,
            timestamp,
            previous,
        }),
        _ => Ok(()),
    }
}

/// Decode both depth lists of a book row.
fn decode_book_row(row: &BookRow, book_seen: bool) -> Result<BookUpdate> {
    let bids = decode_row_side(&row.symbol, row.timestamp, &row.bids_raw)?;
    let asks = decode_row_side(&row.symbol, row.timestamp, &row.asks_raw)?;
    Ok(BookUpdate {
        symbol: row.symbol.clone(),
        tier: row.tier,
        timestamp: row.timestamp,
        event: BookEvent::new(row.kind.resolve(book_seen), bids, asks),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyReporterConfig;
    use crate::rows::BookRowKind;
    use crate::types::{BookEventKind, RefPrice, TakerSide, Trade};
    use rust_decimal_macros::dec;

    fn quiet() -> AnomalyReporter {
        AnomalyReporter::with_config(AnomalyReporterConfig::default().with_logging(false))
    }

    fn book_row(symbol: &str, tier: DepthTier, ts: i64, bids: &str) -> FeedRow {
        FeedRow::Book(BookRow {
            timestamp: Timestamp::from(ts),
            symbol: Symbol::new(symbol),
            tier,
            bids_raw: bids.to_string(),
            asks_raw: "[]".to_string(),
            kind: BookRowKind::Inferred,
        })
    }

    fn trade_row(symbol: &str, ts: i64) -> FeedRow {
        Trade {
            symbol: Symbol::new(symbol),
            timestamp: Timestamp::from(ts),
            taker_side: TakerSide::Buy,
            price: dec!(100),
            amount: dec!(1),
            ref_bid: None,
            ref_ask: None,
            usd_rate: None,
        }
        .into()
    }

    fn ref_row(symbol: &str, ts: i64) -> FeedRow {
        RefPrice {
            symbol: Symbol::new(symbol),
            timestamp: Timestamp::from(ts),
            bid_price: dec!(99),
            ask_price: dec!(101),
        }
        .into()
    }

    #[test]
    fn test_ordering_key_tie_break() {
        let t = Timestamp::from(10);
        let r = OrderingKey::new(t, StreamKind::Ref, 9);
        let b10 = OrderingKey::new(t, StreamKind::Book(DepthTier::Top10), 8);
        let b1000 = OrderingKey::new(t, StreamKind::Book(DepthTier::Top1000), 7);
        let tr = OrderingKey::new(t, StreamKind::Trade, 0);
        assert!(r < b10 && b10 < b1000 && b1000 < tr);
        assert!(OrderingKey::new(Timestamp::from(9), StreamKind::Trade, 99) < r);
    }

    #[test]
    fn test_merge_order() {
        let mut anomalies = quiet();
        let mut seq = Sequencer::new();
        seq.push(trade_row("A", 10), &mut anomalies);
        seq.push(book_row("A", DepthTier::Top1000, 10, "[[1, 1]]"), &mut anomalies);
        seq.push(book_row("A", DepthTier::Top10, 10, "[[1, 1]]"), &mut anomalies);
        seq.push(ref_row("A", 10), &mut anomalies);
        seq.push(ref_row("B", 3), &mut anomalies);

        let streams: Vec<String> = seq
            .finish()
            .iter()
            .map(|e| format!("{}@{}", e.event.stream(), e.event.timestamp()))
            .collect();
        assert_eq!(
            streams,
            vec!["ref@3", "ref@10", "book-10@10", "book-1000@10", "trade@10"]
        );
    }

    #[test]
    fn test_regression_rejected() {
        let mut anomalies = quiet();
        let mut seq = Sequencer::new();
        assert!(seq.push(book_row("X", DepthTier::Top10, 20, "[[1, 1]]"), &mut anomalies));
        assert!(!seq.push(book_row("X", DepthTier::Top10, 15, "[[2, 1]]"), &mut anomalies));
        // other streams of the same symbol are independent
        assert!(seq.push(book_row("X", DepthTier::Top1000, 15, "[[2, 1]]"), &mut anomalies));
        assert!(seq.push(trade_row("X", 15), &mut anomalies));

        assert_eq!(anomalies.count(AnomalyKind::OrderingError), 1);
        assert_eq!(seq.stats().ordering_rejections, 1);
        assert_eq!(seq.finish().len(), 3);
    }

    #[test]
    fn test_equal_timestamps_accepted() {
        let mut anomalies = quiet();
        let mut seq = Sequencer::new();
        assert!(seq.push(trade_row("X", 5), &mut anomalies));
        assert!(seq.push(trade_row("X", 5), &mut anomalies));
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_inferred_snapshot_then_deltas() {
        let mut anomalies = quiet();
        let mut seq = Sequencer::new();
        seq.push(book_row("X", DepthTier::Top10, 1, "[[1, 1]]"), &mut anomalies);
        seq.push(book_row("X", DepthTier::Top10, 2, "[[1, 0]]"), &mut anomalies);
        seq.push(book_row("X", DepthTier::Top1000, 3, "[[1, 1]]"), &mut anomalies);

        let kinds: Vec<BookEventKind> = seq
            .finish()
            .into_iter()
            .filter_map(|e| match e.event {
                MarketEvent::Book(update) => Some(update.event.kind()),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![BookEventKind::Snapshot, BookEventKind::Delta, BookEventKind::Snapshot]
        );
    }

    #[test]
    fn test_decode_failure_skips_row() {
        let mut anomalies = quiet();
        let mut seq = Sequencer::new();
        assert!(!seq.push(book_row("X", DepthTier::Top10, 1, "[[1, 1]"), &mut anomalies));
        // the next good row becomes the snapshot
        seq.push(book_row("X", DepthTier::Top10, 2, "[[1, 1]]"), &mut anomalies);

        assert_eq!(anomalies.count(AnomalyKind::DecodeError), 1);
        let decode = &anomalies.anomalies()[0];
        assert_eq!(decode.context.get("raw").map(String::as_str), Some("[[1, 1]"));

        let events = seq.finish();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0].event, MarketEvent::Book(u) if u.event.is_snapshot()));
    }

    #[test]
    fn test_gap_detection() {
        let mut anomalies = quiet();
        let mut seq = Sequencer::with_config(SequencerConfig::new().with_gap_threshold(dec!(5)));
        seq.push(trade_row("X", 1), &mut anomalies);
        seq.push(trade_row("X", 6), &mut anomalies);
        seq.push(trade_row("X", 20), &mut anomalies);

        assert_eq!(anomalies.count(AnomalyKind::TimestampGap), 1);
        assert_eq!(seq.stats().gaps, 1);
        // gaps do not reject
        assert_eq!(seq.finish().len(), 3);
    }

    #[test]
    fn test_sequence_numbers() {
        let mut anomalies = quiet();
        let mut seq = Sequencer::new();
        seq.extend(vec![trade_row("X", 3), ref_row("X", 1)], &mut anomalies);
        let events = seq.finish();
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[1].seq, 1);
        assert_eq!(events[0].event.timestamp(), Timestamp::from(1));
    }
}
