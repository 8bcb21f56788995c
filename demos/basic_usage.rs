//! Basic usage example: replay three small feeds and inspect the results.
//!
//! Run with: RUST_LOG=info cargo run --example basic_usage

use l2_book_reconstructor::{
    simulate_limit_order, AnomalyKind, DepthStats, DepthTier, Feed, RecordSource, Replay,
    ReplayConfig, Side, Symbol, Timestamp,
};
use rust_decimal::Decimal;

fn main() -> l2_book_reconstructor::Result<()> {
    env_logger::init();

    println!("=================================================================");
    println!("L2 Book Reconstructor - Basic Usage Example");
    println!("=================================================================\n");

    let config = ReplayConfig::new().with_context_levels(3);
    let mut replay = Replay::new(config);

    // Depth feed: first row per symbol is the snapshot, later rows are deltas
    let accepted = replay.add_source(RecordSource::new(
        Feed::Book(DepthTier::Top10),
        vec![
            vec!["1", "BTC/USD", "[[100, 5], [99, 3]]", "[[101, 4], [102, 2]]"],
            vec!["3", "BTC/USD", "[[100, 0]]", "[]"],
            vec!["4", "BTC/USD", "[[100.5, 1]]", "[[100.4, 2]]"],
        ],
    ))?;
    println!("✓ Depth rows accepted: {accepted}");

    let accepted = replay.add_source(RecordSource::new(
        Feed::Ref,
        vec![vec!["BTC/USD", "2", "99.9", "100.1"]],
    ))?;
    println!("✓ Reference rows accepted: {accepted}");

    let accepted = replay.add_source(RecordSource::new(
        Feed::Trade,
        vec![
            vec!["BTC/USD", "buy", "101", "0.5", "2"],
            vec!["BTC/USD", "sell", "99", "1", "3"],
            vec!["BTC/USD", "buy", "100.4", "1", "bad"],
        ],
    ))?;
    println!("✓ Trade rows accepted: {accepted}\n");

    let output = replay.run();

    println!("Enriched trades:");
    for trade in &output.enriched {
        println!(
            "  #{} {} {:?} {} @ {}  mid={:?} spread={:?} bps_from_mid={:?} ref_mid={:?}",
            trade.sequence,
            trade.trade.symbol,
            trade.trade.taker_side,
            trade.trade.amount,
            trade.trade.price,
            trade.mid(),
            trade.spread(),
            trade.trade_to_mid_bps().map(|bps| bps.round_dp(2)),
            trade.reference.as_ref().and_then(|r| r.mid),
        );
    }
    println!();

    let symbol = Symbol::new("BTC/USD");
    if let Some(book) = output
        .engine
        .state_as_of(&symbol, DepthTier::Top10, Timestamp::from(3))
    {
        let top = book.top_n(3);
        println!("Book as of t=3 (update #{}):", book.update_seq);
        println!("  bids: {:?}", top.bids);
        println!("  asks: {:?}", top.asks);

        let asks = DepthStats::from_side(&book.asks);
        println!(
            "  ask depth: {} across {} levels, VWAP {:?}",
            asks.total_quantity, asks.levels_count, asks.weighted_avg_price
        );

        let sim = simulate_limit_order(&book, Side::Bid, Decimal::from(101), Decimal::from(6), 3);
        println!(
            "  buy 6 @ 101 would fill {} (avg {:?}) and rest {}",
            sim.filled,
            sim.avg_fill_price(),
            sim.rested
        );
        println!();
    }

    let summary = output.anomalies.summary();
    println!("Anomalies: {}", summary.total);
    for (kind, count) in &summary.by_kind {
        println!("  {kind}: {count}");
    }
    if output.anomalies.count(AnomalyKind::CrossedBook) > 0 {
        println!("  (the t=4 update crossed the book; it was applied and flagged)");
    }

    println!("\n=================================================================");
    Ok(())
}
