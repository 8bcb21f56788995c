//! # L2-Book-Reconstructor
//!
//! Exact L2 order-book reconstruction from snapshot/delta depth feeds, with a
//! time-causal join of every trade against the book and reference price in
//! force when it printed.
//!
//! Three feeds come in (depth rows at one or more tiers, trades, reference
//! quotes). They are merged into one deterministic sequence, books are
//! rebuilt per (symbol, tier), and each trade leaves as an enriched record.
//! Bad input never stops a run: it becomes an entry in the anomaly report.
//!
//! ## Features
//!
//! - **Exact arithmetic**: Prices, quantities and timestamps are decimals
//! - **Deterministic merge**: Ties on timestamp resolve ref → book → trade
//! - **Point-in-time books**: Any book can be read as of any replayed time
//! - **Anomaly reporting**: Crossed books, ordering errors, missing context,
//!   exported as JSON or CSV
//! - **Parallel replay**: Symbols replayed on rayon with the `parallel` feature
//!
//! ## Quick Start
//!
//! ### Replay rows end to end
//!
//! ```rust
//! use l2_book_reconstructor::{replay, AnomalyKind, BookRow, DepthTier, FeedRow, RefPrice, ReplayConfig, Trade};
//! use rust_decimal::Decimal;
//!
//! let rows: Vec<FeedRow> = vec![
//!     BookRow::from_fields(DepthTier::Top10, &["1", "BTC/USD", "[[100, 5], [99, 3]]", "[[101, 4]]"])
//!         .unwrap()
//!         .into(),
//!     RefPrice::from_fields(&["BTC/USD", "5", "99.9", "100.1"]).unwrap().into(),
//!     Trade::from_fields(&["BTC/USD", "buy", "101", "0.5", "7"]).unwrap().into(),
//! ];
//!
//! let output = replay(rows, &ReplayConfig::new().quiet());
//! let trade = &output.enriched[0];
//! assert_eq!(trade.mid(), Some(Decimal::new(1005, 1)));
//! assert_eq!(trade.reference.as_ref().unwrap().bid_price, Decimal::new(999, 1));
//! assert_eq!(output.anomalies.count(AnomalyKind::NoBookAtTradeTime), 0);
//! ```
//!
//! ### Drive a single book
//!
//! ```rust
//! use l2_book_reconstructor::{BookEvent, BookReconstructor, DepthTier, PriceLevel, Symbol, Timestamp};
//! use rust_decimal::Decimal;
//!
//! let mut book = BookReconstructor::new(Symbol::new("BTC/USD"), DepthTier::Top10);
//! book.apply(
//!     Timestamp::from(1),
//!     &BookEvent::Snapshot {
//!         bids: vec![PriceLevel::new(Decimal::from(100), Decimal::from(5))],
//!         asks: vec![PriceLevel::new(Decimal::from(101), Decimal::from(4))],
//!     },
//! )
//! .unwrap();
//!
//! assert_eq!(book.state().spread(), Some(Decimal::ONE));
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Core types: `Symbol`, `Timestamp`, `PriceLevel`, `BookEvent`, `Trade`, `RefPrice` |
//! | [`depth_list`] | Decoder for the nested `[[price, qty], ...]` depth-list encoding |
//! | [`rows`] | Typed feed rows and field typing |
//! | [`source`] | Row sources: `RowSource`, `VecSource`, `RecordSource` |
//! | [`sequencer`] | Merge of all feeds into one ordered sequence |
//! | [`lob`] | Book reconstruction: `BookSide`, `BookState`, `BookReconstructor`, `ReconstructionEngine` |
//! | [`correlator`] | Trade enrichment against book and reference state |
//! | [`anomaly`] | Anomaly collection, summary and export |
//! | [`analytics`] | `DepthStats` and limit-order simulation |
//! | [`config`] | `ReplayConfig` with JSON persistence |
//! | [`replay`] | End-to-end driver |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `parallel` | ❌ | Replay symbols concurrently on rayon |

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod analytics;
pub mod anomaly;
pub mod config;
pub mod correlator;
pub mod depth_list;
pub mod error;
pub mod lob;
pub mod replay;
pub mod rows;
pub mod sequencer;
pub mod source;
pub mod types;

// Re-exports - Core types
pub use error::{ReconError, Result};
pub use types::{
    BookConsistency, BookEvent, BookEventKind, BookUpdate, DepthTier, MarketEvent, PriceLevel,
    RefPrice, Side, StreamKind, Symbol, TakerSide, Timestamp, Trade,
};

// Re-exports - Rows and sources
pub use rows::{BookRow, BookRowKind, FeedRow, RefRow, TradeRow};
pub use source::{Feed, RecordSource, RowSource, SourceMetadata, VecSource};

// Re-exports - Book reconstruction
pub use lob::{
    BookReconstructor, BookSide, BookState, BookStatus, DepthView, ReconstructionEngine,
    ReconstructorConfig,
};

// Re-exports - Sequencing and correlation
pub use correlator::{Correlator, CorrelatorConfig, EnrichedTrade};
pub use sequencer::{SequencedEvent, Sequencer, SequencerConfig};

// Re-exports - Anomalies
pub use anomaly::{Anomaly, AnomalyKind, AnomalyReporter, AnomalyReporterConfig};

// Re-exports - Analytics
pub use analytics::{simulate_limit_order, DepthStats, LimitOrderSimulation};

// Re-exports - Replay
pub use config::ReplayConfig;
pub use replay::{replay, Replay, ReplayOutput, ReplayStats};
