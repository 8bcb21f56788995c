//! Time-causal join of trades against book and reference-price state.
//!
//! Each trade is paired with the book (at the configured tier) and the
//! reference quote carrying the greatest timestamp at or before the trade's
//! own. Nothing from the future of a trade is ever attached to it, and no
//! trade is ever dropped: missing context leaves the fields empty and
//! records an anomaly.

use std::sync::Arc;

use ahash::AHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::anomaly::{Anomaly, AnomalyKind, AnomalyReporter};
use crate::lob::book::{BookState, DepthView, BPS};
use crate::lob::ReconstructionEngine;
use crate::types::{BookConsistency, DepthTier, PriceLevel, RefPrice, Symbol, Timestamp, Trade};

/// Configuration for trade correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Book tier trades are joined against
    pub tier: DepthTier,

    /// Top levels per side copied into each enriched trade (0 = none)
    pub context_levels: usize,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            tier: DepthTier::Top10,
            context_levels: 0,
        }
    }
}

impl CorrelatorConfig {
    pub fn new(tier: DepthTier) -> Self {
        Self {
            tier,
            ..Default::default()
        }
    }

    pub fn with_context_levels(mut self, levels: usize) -> Self {
        self.context_levels = levels;
        self
    }
}

/// Book context attached to a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookContext {
    /// Timestamp of the book state used
    pub timestamp: Timestamp,
    pub update_seq: u64,
    pub best_bid: Option<PriceLevel>,
    pub best_ask: Option<PriceLevel>,
    pub mid: Option<Decimal>,
    pub spread: Option<Decimal>,
    /// (price − mid) / mid × 10000
    pub trade_to_mid_bps: Option<Decimal>,
    pub consistency: BookConsistency,
    /// Σ price × quantity resting at or better than the trade price on the
    /// side the taker consumed; absent when it does not fit in a `Decimal`
    pub notional_ahead: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub levels: Option<DepthView>,
}

impl BookContext {
    fn capture(book: &BookState, trade: &Trade, context_levels: usize) -> Self {
        let mid = book.mid_price();
        Self {
            timestamp: book.timestamp,
            update_seq: book.update_seq,
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            mid,
            spread: book.spread(),
            trade_to_mid_bps: mid.and_then(|mid| distance_bps(trade.price, mid)),
            consistency: book.consistency(),
            notional_ahead: book.notional_ahead(trade.taker_side.consumed_side(), trade.price),
            levels: (context_levels > 0).then(|| book.top_n(context_levels)),
        }
    }
}

/// Reference quote attached to a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefContext {
    pub timestamp: Timestamp,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub mid: Option<Decimal>,
    /// (price − ref mid) / ref mid × 10000
    pub trade_to_ref_mid_bps: Option<Decimal>,
}

impl RefContext {
    fn capture(quote: &RefPrice, trade: &Trade) -> Self {
        let mid = quote.mid();
        Self {
            timestamp: quote.timestamp,
            bid_price: quote.bid_price,
            ask_price: quote.ask_price,
            mid,
            trade_to_ref_mid_bps: mid.and_then(|mid| distance_bps(trade.price, mid)),
        }
    }
}

/// A trade with the book and reference context in force when it printed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTrade {
    /// Position of the trade in the merged sequence
    pub sequence: u64,
    pub trade: Arc<Trade>,
    /// Tier the book context comes from
    pub tier: DepthTier,
    pub book: Option<BookContext>,
    pub reference: Option<RefContext>,
}

impl EnrichedTrade {
    #[inline]
    pub fn mid(&self) -> Option<Decimal> {
        self.book.as_ref().and_then(|b| b.mid)
    }

    #[inline]
    pub fn spread(&self) -> Option<Decimal> {
        self.book.as_ref().and_then(|b| b.spread)
    }

    #[inline]
    pub fn trade_to_mid_bps(&self) -> Option<Decimal> {
        self.book.as_ref().and_then(|b| b.trade_to_mid_bps)
    }
}

/// Statistics for one correlation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelatorStats {
    pub trades: u64,
    pub with_book: u64,
    pub with_ref: u64,
    /// Trades joined against a crossed or locked book
    pub crossed_context: u64,
}

impl CorrelatorStats {
    /// Add another pass's counts.
    pub fn merge(&mut self, other: &CorrelatorStats) {
        self.trades += other.trades;
        self.with_book += other.with_book;
        self.with_ref += other.with_ref;
        self.crossed_context += other.crossed_context;
    }
}

/// Joins trades against book and reference state.
#[derive(Debug, Clone, Default)]
pub struct Correlator {
    config: CorrelatorConfig,

    /// Reference quotes per symbol, sorted by timestamp
    refs: AHashMap<Symbol, Vec<Arc<RefPrice>>>,

    stats: CorrelatorStats,
}

impl Correlator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self {
            config,
            refs: AHashMap::new(),
            stats: CorrelatorStats::default(),
        }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Remember a reference quote.
    pub fn observe_ref(&mut self, quote: Arc<RefPrice>) {
        let quotes = self.refs.entry(quote.symbol.clone()).or_default();
        match quotes.last() {
            Some(last) if last.timestamp > quote.timestamp => {
                let at = quotes.partition_point(|q| q.timestamp <= quote.timestamp);
                quotes.insert(at, quote);
            }
            _ => quotes.push(quote),
        }
    }

    /// Latest reference quote for `symbol` at or before `at`.
    pub fn ref_as_of(&self, symbol: &Symbol, at: Timestamp) -> Option<&Arc<RefPrice>> {
        let quotes = self.refs.get(symbol)?;
        let end = quotes.partition_point(|q| q.timestamp <= at);
        end.checked_sub(1).map(|i| &quotes[i])
    }

    /// Join one trade.
    pub fn enrich(
        &mut self,
        sequence: u64,
        trade: Arc<Trade>,
        books: &ReconstructionEngine,
        anomalies: &mut AnomalyReporter,
    ) -> EnrichedTrade {
        self.stats.trades += 1;
        let tier = self.config.tier;

        let book = books
            .state_as_of(&trade.symbol, tier, trade.timestamp)
            .map(|state| BookContext::capture(&state, &trade, self.config.context_levels));
        match &book {
            Some(context) => {
                self.stats.with_book += 1;
                if context.consistency.is_crossed_or_locked() {
                    self.stats.crossed_context += 1;
                }
            }
            None => {
                anomalies.record(
                    Anomaly::new(
                        AnomalyKind::NoBookAtTradeTime,
                        format!(
                            "No tier {} book for {} at or before trade at {}",
                            tier, trade.symbol, trade.timestamp
                        ),
                    )
                    .with_symbol(trade.symbol.clone())
                    .with_timestamp(trade.timestamp)
                    .with_sequence(sequence)
                    .with_context("tier", tier.to_string()),
                );
            }
        }

        let reference = self
            .ref_as_of(&trade.symbol, trade.timestamp)
            .map(|quote| RefContext::capture(quote, &trade));
        match &reference {
            Some(_) => self.stats.with_ref += 1,
            None => {
                anomalies.record(
                    Anomaly::new(
                        AnomalyKind::NoRefAtTradeTime,
                        format!(
                            "No reference price for {} at or before trade at {}",
                            trade.symbol, trade.timestamp
                        ),
                    )
                    .with_symbol(trade.symbol.clone())
                    .with_timestamp(trade.timestamp)
                    .with_sequence(sequence),
                );
            }
        }

        EnrichedTrade {
            sequence,
            trade,
            tier,
            book,
            reference,
        }
    }

    pub fn stats(&self) -> &CorrelatorStats {
        &self.stats
    }
}

/// (price − mid) / mid × 10000, absent when mid ≤ 0 or out of range.
pub fn distance_bps(price: Decimal, mid: Decimal) -> Option<Decimal> {
    if mid <= Decimal::ZERO {
        return None;
    }
    price.checked_sub(mid)?.checked_div(mid)?.checked_mul(BPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyReporterConfig;
    use crate::lob::ReconstructorConfig;
    use crate::types::{BookEvent, BookUpdate, TakerSide};
    use rust_decimal_macros::dec;

    fn quiet() -> AnomalyReporter {
        AnomalyReporter::with_config(AnomalyReporterConfig::default().with_logging(false))
    }

    fn btc() -> Symbol {
        Symbol::new("BTC/USD")
    }

    fn trade(ts: i64, side: TakerSide, price: Decimal) -> Arc<Trade> {
        Arc::new(Trade {
            symbol: btc(),
            timestamp: Timestamp::from(ts),
            taker_side: side,
            price,
            amount: dec!(1),
            ref_bid: None,
            ref_ask: None,
            usd_rate: None,
        })
    }

    fn quote(ts: i64, bid: Decimal, ask: Decimal) -> Arc<RefPrice> {
        Arc::new(RefPrice {
            symbol: btc(),
            timestamp: Timestamp::from(ts),
            bid_price: bid,
            ask_price: ask,
        })
    }

    fn engine_with_snapshot(ts: i64) -> ReconstructionEngine {
        let mut engine =
            ReconstructionEngine::with_config(ReconstructorConfig::default().with_logging(false));
        let update = BookUpdate {
            symbol: btc(),
            tier: DepthTier::Top10,
            timestamp: Timestamp::from(ts),
            event: BookEvent::Snapshot {
                bids: vec![
                    PriceLevel::new(dec!(100), dec!(5)),
                    PriceLevel::new(dec!(99), dec!(3)),
                ],
                asks: vec![
                    PriceLevel::new(dec!(101), dec!(4)),
                    PriceLevel::new(dec!(102), dec!(1)),
                ],
            },
        };
        engine.apply(&update, None, &mut quiet());
        engine
    }

    #[test]
    fn test_trade_before_first_book() {
        let engine = engine_with_snapshot(12);
        let mut correlator = Correlator::new(CorrelatorConfig::new(DepthTier::Top10));
        let mut anomalies = quiet();

        let enriched = correlator.enrich(0, trade(10, TakerSide::Buy, dec!(101)), &engine, &mut anomalies);
        assert!(enriched.book.is_none());
        assert_eq!(anomalies.count(AnomalyKind::NoBookAtTradeTime), 1);
        assert_eq!(anomalies.count(AnomalyKind::NoRefAtTradeTime), 1);
    }

    #[test]
    fn test_book_context_fields() {
        let engine = engine_with_snapshot(5);
        let mut correlator = Correlator::new(
            CorrelatorConfig::new(DepthTier::Top10).with_context_levels(1),
        );
        let mut anomalies = quiet();

        let enriched = correlator.enrich(3, trade(7, TakerSide::Buy, dec!(101)), &engine, &mut anomalies);
        let book = enriched.book.as_ref().unwrap();
        assert_eq!(book.timestamp, Timestamp::from(5));
        assert_eq!(enriched.mid(), Some(dec!(100.5)));
        assert_eq!(enriched.spread(), Some(dec!(1)));
        let bps = enriched.trade_to_mid_bps().unwrap();
        assert!((bps - dec!(49.751243781)).abs() < dec!(0.000001));
        // buy consumes asks at or below 101
        assert_eq!(book.notional_ahead, Some(dec!(404)));
        assert_eq!(book.levels.as_ref().unwrap().bids.len(), 1);
        assert_eq!(enriched.sequence, 3);
    }

    #[test]
    fn test_other_tier_has_no_book() {
        let engine = engine_with_snapshot(5);
        let mut correlator = Correlator::new(CorrelatorConfig::new(DepthTier::Top1000));
        let mut anomalies = quiet();
        let enriched = correlator.enrich(0, trade(7, TakerSide::Sell, dec!(100)), &engine, &mut anomalies);
        assert!(enriched.book.is_none());
        assert_eq!(enriched.tier, DepthTier::Top1000);
    }

    #[test]
    fn test_ref_join_uses_latest_at_or_before() {
        let engine = engine_with_snapshot(1);
        let mut correlator = Correlator::default();
        correlator.observe_ref(quote(5, dec!(99.9), dec!(100.1)));
        correlator.observe_ref(quote(9, dec!(98), dec!(99)));
        let mut anomalies = quiet();

        let enriched = correlator.enrich(0, trade(7, TakerSide::Sell, dec!(100)), &engine, &mut anomalies);
        let reference = enriched.reference.unwrap();
        assert_eq!(reference.bid_price, dec!(99.9));
        assert_eq!(reference.ask_price, dec!(100.1));
        assert_eq!(reference.mid, Some(dec!(100)));
        assert_eq!(reference.trade_to_ref_mid_bps, Some(Decimal::ZERO));
        assert_eq!(anomalies.count(AnomalyKind::NoRefAtTradeTime), 0);
    }

    #[test]
    fn test_ref_at_same_timestamp_is_visible() {
        let mut correlator = Correlator::default();
        correlator.observe_ref(quote(7, dec!(1), dec!(3)));
        assert!(correlator.ref_as_of(&btc(), Timestamp::from(7)).is_some());
        assert!(correlator.ref_as_of(&btc(), Timestamp::from(6)).is_none());
    }

    #[test]
    fn test_out_of_order_refs_stay_sorted() {
        let mut correlator = Correlator::default();
        correlator.observe_ref(quote(9, dec!(9), dec!(10)));
        correlator.observe_ref(quote(5, dec!(5), dec!(6)));
        let found = correlator.ref_as_of(&btc(), Timestamp::from(6)).unwrap();
        assert_eq!(found.bid_price, dec!(5));
    }

    #[test]
    fn test_distance_bps() {
        assert_eq!(distance_bps(dec!(101), dec!(100)), Some(dec!(100)));
        assert_eq!(distance_bps(dec!(99), dec!(100)), Some(dec!(-100)));
        assert_eq!(distance_bps(dec!(1), Decimal::ZERO), None);
        assert_eq!(distance_bps(Decimal::MIN, dec!(1)), None);
    }
}
