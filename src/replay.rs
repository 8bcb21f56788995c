//! End-to-end replay.
//!
//! Rows from every feed go through the [`Sequencer`] once; the merged
//! sequence then drives the [`ReconstructionEngine`] (book events), the
//! [`Correlator`]'s reference store (ref events) and the trade join (trade
//! events), in that one order. Nothing here aborts: row failures, ordering
//! violations and missing context all end up in the anomaly report.
//!
//! With the `parallel` feature and [`ReplayConfig::parallel`] set, the
//! sequence is partitioned by symbol and each partition is replayed on the
//! rayon pool. Symbols never share state, so the merged output equals the
//! sequential one.
//!
//! # Example
//!
//! ```
//! use l2_book_reconstructor::config::ReplayConfig;
//! use l2_book_reconstructor::replay::Replay;
//! use l2_book_reconstructor::source::{Feed, RecordSource};
//! use l2_book_reconstructor::types::DepthTier;
//!
//! let mut replay = Replay::new(ReplayConfig::new().quiet());
//! replay
//!     .add_source(RecordSource::new(
//!         Feed::Book(DepthTier::Top10),
//!         vec![vec!["1", "BTC/USD", "[[100, 5]]", "[[101, 4]]"]],
//!     ))
//!     .unwrap();
//! replay
//!     .add_source(RecordSource::new(
//!         Feed::Trade,
//!         vec![vec!["BTC/USD", "buy", "101", "0.5", "2"]],
//!     ))
//!     .unwrap();
//!
//! let output = replay.run();
//! assert_eq!(output.enriched.len(), 1);
//! assert_eq!(output.enriched[0].spread(), Some(1.into()));
//! ```

use serde::{Deserialize, Serialize};

use crate::anomaly::{Anomaly, AnomalyReporter};
use crate::config::ReplayConfig;
use crate::correlator::{Correlator, CorrelatorStats, EnrichedTrade};
use crate::error::Result;
use crate::lob::{EngineStats, ReconstructionEngine};
use crate::rows::FeedRow;
use crate::sequencer::{SequencedEvent, Sequencer, SequencerStats};
use crate::source::RowSource;
use crate::types::MarketEvent;

// ============================================================================
// Output
// ============================================================================

/// Counters for a whole replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayStats {
    /// Records that could not be typed
    pub malformed_rows: u64,
    pub sequencer: SequencerStats,
    pub engine: EngineStats,
    pub correlator: CorrelatorStats,
    /// Symbol partitions replayed
    pub partitions: usize,
    pub anomalies: u64,
}

/// Everything a replay produces.
#[derive(Debug, Clone)]
pub struct ReplayOutput {
    /// One record per accepted trade, in sequence order
    pub enriched: Vec<EnrichedTrade>,
    pub anomalies: AnomalyReporter,
    /// Final books, queryable as of any replayed time
    pub engine: ReconstructionEngine,
    pub stats: ReplayStats,
}

// ============================================================================
// Replay
// ============================================================================

/// Collects rows from any number of sources, then replays them.
#[derive(Debug)]
pub struct Replay {
    config: ReplayConfig,
    sequencer: Sequencer,
    anomalies: AnomalyReporter,
    malformed_rows: u64,
}

impl Replay {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            sequencer: Sequencer::with_config(config.sequencer.clone()),
            anomalies: AnomalyReporter::with_config(config.anomalies.clone()),
            malformed_rows: 0,
            config,
        }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Offer one typed row. Returns `true` if it was accepted.
    pub fn push(&mut self, row: FeedRow) -> bool {
        self.sequencer.push(row, &mut self.anomalies)
    }

    /// Offer one record result; an `Err` is reported and skipped.
    pub fn push_result(&mut self, row: Result<FeedRow>) -> bool {
        match row {
            Ok(row) => self.push(row),
            Err(err) => {
                self.malformed_rows += 1;
                self.anomalies.record(Anomaly::from_error(&err));
                false
            }
        }
    }

    /// Offer every row of a source, in its order.
    ///
    /// Returns the number of rows accepted. Fails only if the source itself
    /// cannot be opened.
    pub fn add_source<S: RowSource>(&mut self, source: S) -> Result<u64> {
        let metadata = source.metadata();
        log::debug!(
            "Reading {:?} rows from {} (provider {}, {} bytes, ~{} rows)",
            metadata.feed,
            metadata
                .file_path
                .as_ref()
                .map_or_else(|| "memory".to_string(), |p| p.display().to_string()),
            metadata.provider.as_deref().unwrap_or("unknown"),
            metadata.file_size.map_or_else(|| "?".to_string(), |n| n.to_string()),
            metadata.estimated_rows.map_or_else(|| "?".to_string(), |n| n.to_string()),
        );
        if let Some(rows) = metadata.estimated_rows {
            self.sequencer.reserve(usize::try_from(rows).unwrap_or(0));
        }
        let mut accepted = 0;
        for row in source.rows()? {
            if self.push_result(row) {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Offer typed rows.
    pub fn add_rows<I: IntoIterator<Item = FeedRow>>(&mut self, rows: I) -> u64 {
        rows.into_iter().map(|row| self.push(row) as u64).sum()
    }

    /// Sequence everything offered and replay it.
    pub fn run(self) -> ReplayOutput {
        let Replay {
            config,
            sequencer,
            mut anomalies,
            malformed_rows,
        } = self;

        let sequencer_stats = sequencer.stats().clone();
        let events = sequencer.finish();

        let (partitions, partial) = if config.parallel {
            run_partitioned(events, &config, &mut anomalies)
        } else {
            (1, replay_events(events, &config, &mut anomalies))
        };

        let stats = ReplayStats {
            malformed_rows,
            sequencer: sequencer_stats,
            engine: partial.engine.stats().clone(),
            correlator: partial.correlator,
            partitions,
            anomalies: anomalies.total_count(),
        };

        log::info!(
            "Replay finished: {} rows in, {} sequenced, {} books, {} trades enriched ({} with book, {} with ref), {} anomalies",
            stats.sequencer.rows_in + malformed_rows,
            stats.sequencer.accepted,
            stats.engine.book_count,
            stats.correlator.trades,
            stats.correlator.with_book,
            stats.correlator.with_ref,
            stats.anomalies
        );

        ReplayOutput {
            enriched: partial.enriched,
            anomalies,
            engine: partial.engine,
            stats,
        }
    }
}

/// Replay typed rows in one call.
pub fn replay<I: IntoIterator<Item = FeedRow>>(rows: I, config: &ReplayConfig) -> ReplayOutput {
    let mut replay = Replay::new(config.clone());
    replay.add_rows(rows);
    replay.run()
}

// ============================================================================
// Event loop
// ============================================================================

/// Output of replaying one run of events.
struct Partial {
    engine: ReconstructionEngine,
    correlator: CorrelatorStats,
    enriched: Vec<EnrichedTrade>,
}

fn replay_events(
    events: Vec<SequencedEvent>,
    config: &ReplayConfig,
    anomalies: &mut AnomalyReporter,
) -> Partial {
    let mut engine = ReconstructionEngine::with_config(config.reconstructor.clone());
    let mut correlator = Correlator::new(config.correlator.clone());
    let mut enriched = Vec::new();

    for SequencedEvent { seq, event } in events {
        match event {
            MarketEvent::Ref(quote) => correlator.observe_ref(quote),
            MarketEvent::Book(update) => {
                engine.apply(&update, Some(seq), anomalies);
            }
            MarketEvent::Trade(trade) => {
                enriched.push(correlator.enrich(seq, trade, &engine, anomalies));
            }
        }
    }

    Partial {
        engine,
        correlator: correlator.stats().clone(),
        enriched,
    }
}

#[cfg(feature = "parallel")]
fn run_partitioned(
    events: Vec<SequencedEvent>,
    config: &ReplayConfig,
    anomalies: &mut AnomalyReporter,
) -> (usize, Partial) {
    use ahash::AHashMap;
    use rayon::prelude::*;

    // Partition events by symbol, keeping sequence order within each
    let mut by_symbol: AHashMap<crate::types::Symbol, Vec<SequencedEvent>> = AHashMap::new();
    for event in events {
        by_symbol
            .entry(event.event.symbol().clone())
            .or_default()
            .push(event);
    }
    let partitions: Vec<Vec<SequencedEvent>> = by_symbol.into_values().collect();
    let count = partitions.len();

    // Partition reporters keep everything and stay quiet; the merge below
    // applies the caller's storage cap and logging.
    let partition_config = config
        .anomalies
        .clone()
        .with_logging(false)
        .with_max_stored(usize::MAX);

    let results: Vec<(Partial, Vec<Anomaly>)> = partitions
        .into_par_iter()
        .map(|events| {
            let mut local = AnomalyReporter::with_config(partition_config.clone());
            let partial = replay_events(events, config, &mut local);
            (partial, local.drain())
        })
        .collect();

    let mut merged = Partial {
        engine: ReconstructionEngine::with_config(config.reconstructor.clone()),
        correlator: CorrelatorStats::default(),
        enriched: Vec::new(),
    };
    let mut pending = Vec::new();
    for (partial, local) in results {
        merged.engine.absorb(partial.engine);
        merged.correlator.merge(&partial.correlator);
        merged.enriched.extend(partial.enriched);
        pending.extend(local);
    }

    merged.enriched.sort_by_key(|trade| trade.sequence);
    // stable: anomalies of one event keep their emission order
    pending.sort_by_key(|anomaly| anomaly.sequence.unwrap_or(u64::MAX));
    anomalies.extend(pending);

    log::debug!("Replayed {count} symbol partitions in parallel");
    (count, merged)
}

#[cfg(not(feature = "parallel"))]
fn run_partitioned(
    events: Vec<SequencedEvent>,
    config: &ReplayConfig,
    anomalies: &mut AnomalyReporter,
) -> (usize, Partial) {
    log::debug!("Built without the parallel feature, replaying sequentially");
    (1, replay_events(events, config, anomalies))
}
