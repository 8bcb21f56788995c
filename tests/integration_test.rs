//! End-to-end tests over small hand-written feeds.
//!
//! Each scenario goes through the public API only: rows are typed from
//! tokenized records, replayed, and checked through the enriched trades,
//! the engine's point-in-time queries and the anomaly report.
//!
//! Run with:
//! ```bash
//! cargo test --test integration_test
//! ```

use l2_book_reconstructor::{
    replay, simulate_limit_order, AnomalyKind, AnomalyReporterConfig, BookEvent, BookReconstructor,
    BookRow, DepthStats, DepthTier, Feed, FeedRow, PriceLevel, RecordSource, RefPrice, Replay,
    ReplayConfig, Side, Symbol, Timestamp, Trade,
};
use rust_decimal_macros::dec;

fn quiet() -> ReplayConfig {
    ReplayConfig::new().quiet()
}

fn book10(fields: &[&str]) -> FeedRow {
    BookRow::from_fields(DepthTier::Top10, fields).unwrap().into()
}

fn book1000(fields: &[&str]) -> FeedRow {
    BookRow::from_fields(DepthTier::Top1000, fields).unwrap().into()
}

fn trade(fields: &[&str]) -> FeedRow {
    Trade::from_fields(fields).unwrap().into()
}

fn quote(fields: &[&str]) -> FeedRow {
    RefPrice::from_fields(fields).unwrap().into()
}

fn btc() -> Symbol {
    Symbol::new("BTC/USD")
}

// ============================================================================
// Test: Snapshot then delta
// ============================================================================

#[test]
fn test_snapshot_then_delta() {
    let mut book = BookReconstructor::new(Symbol::new("X"), DepthTier::Top10);
    book.apply(
        Timestamp::from(1),
        &BookEvent::Snapshot {
            bids: vec![
                PriceLevel::new(dec!(100), dec!(5)),
                PriceLevel::new(dec!(99), dec!(3)),
            ],
            asks: vec![PriceLevel::new(dec!(101), dec!(4))],
        },
    )
    .unwrap();

    let state = book.state();
    assert_eq!(state.best_bid(), Some(PriceLevel::new(dec!(100), dec!(5))));
    assert_eq!(state.best_ask(), Some(PriceLevel::new(dec!(101), dec!(4))));
    assert_eq!(state.mid_price(), Some(dec!(100.5)));
    assert_eq!(state.spread(), Some(dec!(1)));

    book.apply(
        Timestamp::from(2),
        &BookEvent::Delta {
            bids: vec![PriceLevel::new(dec!(100), dec!(0))],
            asks: vec![],
        },
    )
    .unwrap();
    assert_eq!(book.state().best_bid(), Some(PriceLevel::new(dec!(99), dec!(3))));
    assert_eq!(book.state().update_seq, 2);
}

// ============================================================================
// Test: Time-causal joins
// ============================================================================

#[test]
fn test_trade_before_first_snapshot_has_no_book() {
    let rows = vec![
        trade(&["BTC/USD", "buy", "100", "1", "10"]),
        book10(&["12", "BTC/USD", "[[99, 1]]", "[[101, 1]]"]),
    ];
    let output = replay(rows, &quiet());

    assert_eq!(output.enriched.len(), 1);
    assert!(output.enriched[0].book.is_none());
    assert_eq!(output.anomalies.count(AnomalyKind::NoBookAtTradeTime), 1);

    // the book exists afterwards, but not as of the trade
    assert!(output
        .engine
        .state_as_of(&btc(), DepthTier::Top10, Timestamp::from(10))
        .is_none());
    assert!(output
        .engine
        .state_as_of(&btc(), DepthTier::Top10, Timestamp::from(12))
        .is_some());
}

#[test]
fn test_trade_joins_latest_reference() {
    let rows = vec![
        quote(&["BTC/USD", "5", "99.9", "100.1"]),
        trade(&["BTC/USD", "sell", "100", "2", "7"]),
        quote(&["BTC/USD", "8", "50", "51"]),
    ];
    let output = replay(rows, &quiet());

    let reference = output.enriched[0].reference.as_ref().unwrap();
    assert_eq!(reference.bid_price, dec!(99.9));
    assert_eq!(reference.ask_price, dec!(100.1));
    assert_eq!(reference.timestamp, Timestamp::from(5));
    assert_eq!(output.anomalies.count(AnomalyKind::NoRefAtTradeTime), 0);
}

#[test]
fn test_trade_uses_configured_tier() {
    let rows = vec![
        book10(&["1", "BTC/USD", "[[100, 1]]", "[[102, 1]]"]),
        book1000(&["1", "BTC/USD", "[[100, 1], [99, 7]]", "[[101, 1], [102, 1]]"]),
        trade(&["BTC/USD", "buy", "101", "1", "2"]),
    ];

    let top10 = replay(rows.clone(), &quiet());
    assert_eq!(top10.enriched[0].spread(), Some(dec!(2)));

    let top1000 = replay(rows, &quiet().with_tier(DepthTier::Top1000).with_context_levels(2));
    let context = top1000.enriched[0].book.as_ref().unwrap();
    assert_eq!(context.spread, Some(dec!(1)));
    let levels = context.levels.as_ref().unwrap();
    assert_eq!(levels.bids.len(), 2);
    assert_eq!(levels.bids[1], PriceLevel::new(dec!(99), dec!(7)));
}

#[test]
fn test_notional_ahead_of_trade() {
    let rows = vec![
        book10(&["1", "BTC/USD", "[[100, 1]]", "[[101, 2], [102, 3], [103, 1]]"]),
        trade(&["BTC/USD", "buy", "102", "4", "2"]),
    ];
    let output = replay(rows, &quiet());
    let context = output.enriched[0].book.as_ref().unwrap();
    // buyer consumes asks at or below 102: 101×2 + 102×3
    assert_eq!(context.notional_ahead, Some(dec!(508)));
    assert_eq!(context.trade_to_mid_bps, Some((dec!(102) - dec!(100.5)) / dec!(100.5) * dec!(10000)));
}

#[test]
fn test_embedded_reference_is_not_a_ref_feed_row() {
    let rows = vec![
        book10(&["1", "BTC/USD", "[[100, 1]]", "[[101, 1]]"]),
        trade(&["BTC/USD", "buy", "100", "1", "7", "99.9", "100.1"]),
    ];
    let output = replay(rows, &quiet());

    let enriched = &output.enriched[0];
    assert_eq!(enriched.trade.ref_bid, Some(dec!(99.9)));
    assert_eq!(enriched.trade.ref_ask, Some(dec!(100.1)));
    assert!(enriched.reference.is_none());
    assert!(enriched.book.is_some());
    assert_eq!(output.anomalies.count(AnomalyKind::NoRefAtTradeTime), 1);
}

// ============================================================================
// Test: Quantities at the edge of the decimal range
// ============================================================================

#[test]
fn test_out_of_range_depth_does_not_abort_replay() {
    let huge = "50000000000000000000000000000";
    let asks = format!("[[101, {huge}], [102, {huge}]]");
    let rows = vec![
        book10(&["1", "BTC/USD", "[[100, 1]]", &asks]),
        trade(&["BTC/USD", "buy", "101", "1", "2"]),
    ];
    let output = replay(rows, &quiet());

    assert_eq!(output.anomalies.count(AnomalyKind::QuantityOverflow), 1);
    let state = output.engine.current(&btc(), DepthTier::Top10).unwrap();
    assert_eq!(state.asks.len(), 1);
    assert_eq!(state.asks.quantity_at(dec!(102)), None);

    let context = output.enriched[0].book.as_ref().unwrap();
    assert_eq!(context.mid, Some(dec!(100.5)));
    assert_eq!(context.notional_ahead, None);
}

// ============================================================================
// Test: Ordering and missing snapshots
// ============================================================================

#[test]
fn test_out_of_order_book_row_rejected() {
    let rows = vec![
        book10(&["20", "X", "[[10, 1]]", "[[11, 1]]"]),
        book10(&["15", "X", "[[10, 5]]", "[]"]),
    ];
    let output = replay(rows, &quiet());

    assert_eq!(output.anomalies.count(AnomalyKind::OrderingError), 1);
    assert_eq!(output.stats.sequencer.ordering_rejections, 1);
    let state = output.engine.current(&Symbol::new("X"), DepthTier::Top10).unwrap();
    assert_eq!(state.update_seq, 1);
    assert_eq!(state.bids.quantity_at(dec!(10)), Some(dec!(1)));
}

#[test]
fn test_delta_before_snapshot_is_dropped() {
    let rows = vec![
        book10(&["1", "X", "[[10, 1]]", "[]", "delta"]),
        book10(&["2", "X", "[[10, 2]]", "[[11, 2]]", "snapshot"]),
        book10(&["3", "X", "[[9, 1]]", "[]", "delta"]),
    ];
    let output = replay(rows, &quiet());

    assert_eq!(output.anomalies.count(AnomalyKind::MissingSnapshot), 1);
    let state = output.engine.current(&Symbol::new("X"), DepthTier::Top10).unwrap();
    assert_eq!(state.bids.len(), 2);
    assert_eq!(state.best_bid(), Some(PriceLevel::new(dec!(10), dec!(2))));
}

#[test]
fn test_inferred_kinds_per_tier() {
    // first row of each (symbol, tier) is the snapshot
    let rows = vec![
        book10(&["1", "X", "[[10, 1]]", "[[11, 1]]"]),
        book10(&["2", "X", "[[9, 1]]", "[]"]),
        book1000(&["2", "X", "[[8, 1]]", "[[12, 1]]"]),
    ];
    let output = replay(rows, &quiet());

    let top10 = output.engine.current(&Symbol::new("X"), DepthTier::Top10).unwrap();
    assert_eq!(top10.bids.len(), 2);
    let top1000 = output.engine.current(&Symbol::new("X"), DepthTier::Top1000).unwrap();
    assert_eq!(top1000.best_bid(), Some(PriceLevel::new(dec!(8), dec!(1))));
    assert!(output.anomalies.is_empty());
}

// ============================================================================
// Test: Data anomalies
// ============================================================================

#[test]
fn test_crossed_book_flagged_and_kept() {
    let rows = vec![book10(&["1", "X", "[[101, 1]]", "[[100, 1]]"])];
    let output = replay(rows, &quiet());

    assert_eq!(output.anomalies.count(AnomalyKind::CrossedBook), 1);
    let state = output.engine.current(&Symbol::new("X"), DepthTier::Top10).unwrap();
    assert!(state.is_crossed());
    assert_eq!(state.best_bid().unwrap().price, dec!(101));
}

#[test]
fn test_undecodable_row_reported() {
    let rows = vec![
        book10(&["1", "X", "[[10, 1]]", "[[11, 1]]"]),
        book10(&["2", "X", "[[10, 1, 3]]", "[]"]),
        book10(&["3", "X", "[[10, 4]]", "[]"]),
    ];
    let output = replay(rows, &quiet());

    assert_eq!(output.anomalies.count(AnomalyKind::DecodeError), 1);
    let decode = output.anomalies.of_kind(AnomalyKind::DecodeError).next().unwrap();
    assert_eq!(decode.symbol, Some(Symbol::new("X")));
    assert_eq!(decode.timestamp, Some(Timestamp::from(2)));

    let state = output.engine.current(&Symbol::new("X"), DepthTier::Top10).unwrap();
    assert_eq!(state.bids.quantity_at(dec!(10)), Some(dec!(4)));
}

#[test]
fn test_malformed_records_and_gaps() {
    let mut replay = Replay::new(quiet().with_gap_threshold(dec!(60)));
    replay
        .add_source(RecordSource::new(
            Feed::Ref,
            vec![
                vec!["BTC/USD", "0", "99", "101"],
                vec!["BTC/USD", "ten", "99", "101"],
                vec!["BTC/USD", "100", "99", "101"],
            ],
        ))
        .unwrap();
    let output = replay.run();

    assert_eq!(output.stats.malformed_rows, 1);
    assert_eq!(output.anomalies.count(AnomalyKind::MalformedRow), 1);
    assert_eq!(output.anomalies.count(AnomalyKind::TimestampGap), 1);
}

// ============================================================================
// Test: Anomaly report export
// ============================================================================

#[test]
fn test_anomaly_report_export() {
    let rows = vec![
        trade(&["BTC/USD", "buy", "100", "1", "1"]),
        book10(&["2", "BTC/USD", "[[101, 1]]", "[[100, 1]]"]),
    ];
    let config = quiet().with_anomalies(AnomalyReporterConfig::default().with_logging(false));
    let output = replay(rows, &config);

    let summary = output.anomalies.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.by_kind.get("CROSSED_BOOK"), Some(&1));

    let json = output.anomalies.to_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(parsed.is_object());

    let mut csv = Vec::new();
    output.anomalies.write_csv(&mut csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert_eq!(csv.lines().count(), 4);

    let enriched = serde_json::to_string(&output.enriched).unwrap();
    assert!(enriched.contains("BTC/USD"));
}

// ============================================================================
// Test: Analytics over replayed books
// ============================================================================

#[test]
fn test_analytics_on_point_in_time_book() {
    let rows = vec![
        book10(&["1", "X", "[[100, 5], [99, 3]]", "[[101, 4], [102, 2]]"]),
        book10(&["5", "X", "[]", "[[101, 0]]"]),
    ];
    let output = replay(rows, &quiet());

    let before = output
        .engine
        .state_as_of(&Symbol::new("X"), DepthTier::Top10, Timestamp::from(3))
        .unwrap();
    let asks = DepthStats::from_side(&before.asks);
    assert_eq!(asks.total_quantity, dec!(6));
    assert_eq!(asks.best_price, Some(dec!(101)));

    let sim = simulate_limit_order(&before, Side::Bid, dec!(101), dec!(5), 3);
    assert_eq!(sim.filled, dec!(4));
    assert_eq!(sim.rested, dec!(1));
    assert_eq!(sim.top.bids[0], PriceLevel::new(dec!(101), dec!(1)));

    // engine state untouched by the simulation
    let now = output.engine.current(&Symbol::new("X"), DepthTier::Top10).unwrap();
    assert_eq!(now.best_ask(), Some(PriceLevel::new(dec!(102), dec!(2))));
}
