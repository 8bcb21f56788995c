//! Anomaly tracking for reconstruction and correlation.
//!
//! Every component reports problems here instead of failing: a malformed
//! depth list, a timestamp that went backwards, a delta with no snapshot
//! before it, a trade with nothing to join against. Anomalies are typed,
//! numbered in the order they were observed, and can be exported for
//! debugging and root cause analysis.
//!
//! Unlike a log line, an anomaly is data: nothing is deduplicated, and the
//! per-kind counts always cover every record even when storage is capped.
//!
//! # Example
//!
//! ```
//! use l2_book_reconstructor::anomaly::{AnomalyKind, AnomalyReporter, AnomalyReporterConfig};
//! use l2_book_reconstructor::types::{Symbol, Timestamp};
//!
//! let mut reporter = AnomalyReporter::with_config(
//!     AnomalyReporterConfig::default().with_logging(false),
//! );
//! reporter.report(
//!     AnomalyKind::CrossedBook,
//!     Some(&Symbol::new("BTC/USD")),
//!     Some(Timestamp::from(12)),
//!     "best bid 101 >= best ask 100",
//! );
//!
//! assert_eq!(reporter.count(AnomalyKind::CrossedBook), 1);
//! assert_eq!(reporter.summary().total, 1);
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};
use crate::types::{Symbol, Timestamp};

/// Kind of anomaly, used for classification and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Depth-list text could not be decoded
    DecodeError,
    /// Timestamp regressed within a (symbol, stream); row not applied
    OrderingError,
    /// Delta for a book that has no snapshot yet; row not applied
    MissingSnapshot,
    /// Trade with no book state at or before its timestamp
    NoBookAtTradeTime,
    /// Trade with no reference price at or before its timestamp
    NoRefAtTradeTime,
    /// Best bid ≥ best ask after an applied event
    CrossedBook,
    /// Negative quantity dropped from a snapshot or delta
    NegativeQuantity,
    /// Level dropped because the side total would leave `Decimal` range
    QuantityOverflow,
    /// Zero quantity dropped from a snapshot
    ZeroQuantityInSnapshot,
    /// Snapshot with the same timestamp as the previous one for the book
    DuplicateSnapshot,
    /// Forward timestamp jump above the configured threshold
    TimestampGap,
    /// Row whose fields could not be typed
    MalformedRow,
}

impl AnomalyKind {
    /// Every kind, in declaration order.
    pub const ALL: [AnomalyKind; 12] = [
        AnomalyKind::DecodeError,
        AnomalyKind::OrderingError,
        AnomalyKind::MissingSnapshot,
        AnomalyKind::NoBookAtTradeTime,
        AnomalyKind::NoRefAtTradeTime,
        AnomalyKind::CrossedBook,
        AnomalyKind::NegativeQuantity,
        AnomalyKind::QuantityOverflow,
        AnomalyKind::ZeroQuantityInSnapshot,
        AnomalyKind::DuplicateSnapshot,
        AnomalyKind::TimestampGap,
        AnomalyKind::MalformedRow,
    ];

    /// Get a human-readable name for the kind.
    pub fn name(&self) -> &'static str {
        match self {
            AnomalyKind::DecodeError => "DECODE_ERROR",
            AnomalyKind::OrderingError => "ORDERING_ERROR",
            AnomalyKind::MissingSnapshot => "MISSING_SNAPSHOT",
            AnomalyKind::NoBookAtTradeTime => "NO_BOOK_AT_TRADE_TIME",
            AnomalyKind::NoRefAtTradeTime => "NO_REF_AT_TRADE_TIME",
            AnomalyKind::CrossedBook => "CROSSED_BOOK",
            AnomalyKind::NegativeQuantity => "NEGATIVE_QUANTITY",
            AnomalyKind::QuantityOverflow => "QUANTITY_OVERFLOW",
            AnomalyKind::ZeroQuantityInSnapshot => "ZERO_QUANTITY_IN_SNAPSHOT",
            AnomalyKind::DuplicateSnapshot => "DUPLICATE_SNAPSHOT",
            AnomalyKind::TimestampGap => "TIMESTAMP_GAP",
            AnomalyKind::MalformedRow => "MALFORMED_ROW",
        }
    }

    /// Get severity level (1=low, 2=medium, 3=high).
    pub fn severity(&self) -> u8 {
        match self {
            AnomalyKind::DecodeError => 2,
            AnomalyKind::OrderingError => 3,
            AnomalyKind::MissingSnapshot => 3,
            AnomalyKind::NoBookAtTradeTime => 1,
            AnomalyKind::NoRefAtTradeTime => 1,
            AnomalyKind::CrossedBook => 3,
            AnomalyKind::NegativeQuantity => 2,
            AnomalyKind::QuantityOverflow => 2,
            AnomalyKind::ZeroQuantityInSnapshot => 1,
            AnomalyKind::DuplicateSnapshot => 1,
            AnomalyKind::TimestampGap => 2,
            AnomalyKind::MalformedRow => 2,
        }
    }

    /// Log level an anomaly of this kind is emitted at.
    fn log_level(&self) -> log::Level {
        match self.severity() {
            3 => log::Level::Warn,
            2 => log::Level::Info,
            _ => log::Level::Debug,
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single anomaly record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Reporter-assigned ID (1-based, in observation order)
    pub id: u64,

    pub kind: AnomalyKind,

    /// Symbol of the offending row, when known
    pub symbol: Option<Symbol>,

    /// Data timestamp of the offending row, when known
    pub timestamp: Option<Timestamp>,

    /// Human-readable message
    pub message: String,

    /// Position of the triggering event in the merged sequence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,

    /// Raw context (offending text, previous timestamp, prices, ...)
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub context: BTreeMap<String, String>,
}

impl Anomaly {
    /// Create an anomaly with minimal information. The ID is assigned when
    /// it is recorded.
    pub fn new(kind: AnomalyKind, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind,
            symbol: None,
            timestamp: None,
            message: message.into(),
            sequence: None,
            context: BTreeMap::new(),
        }
    }

    /// Classify an error into an anomaly, carrying its fields as context.
    pub fn from_error(err: &ReconError) -> Self {
        let message = err.to_string();
        match err {
            ReconError::Decode {
                symbol,
                timestamp,
                raw,
                reason,
            } => Anomaly::new(AnomalyKind::DecodeError, message)
                .with_symbol(symbol.clone())
                .with_timestamp(*timestamp)
                .with_context("raw", raw.as_str())
                .with_context("reason", reason.as_str()),
            ReconError::Ordering {
                symbol,
                stream,
                timestamp,
                previous,
            } => Anomaly::new(AnomalyKind::OrderingError, message)
                .with_symbol(symbol.clone())
                .with_timestamp(*timestamp)
                .with_context("stream", stream.to_string())
                .with_context("previous", previous.to_string()),
            ReconError::MissingSnapshot {
                symbol,
                tier,
                timestamp,
            } => Anomaly::new(AnomalyKind::MissingSnapshot, message)
                .with_symbol(symbol.clone())
                .with_timestamp(*timestamp)
                .with_context("tier", tier.to_string()),
            ReconError::InvalidField { field, value, .. } => {
                Anomaly::new(AnomalyKind::MalformedRow, message)
                    .with_context("field", *field)
                    .with_context("value", value.as_str())
            }
            _ => Anomaly::new(AnomalyKind::MalformedRow, message),
        }
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Add context key-value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Summary statistics for anomalies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    /// Total number of anomalies, stored or not
    pub total: u64,

    /// Anomalies observed after storage hit `max_stored`
    pub not_stored: u64,

    /// Count by kind name
    pub by_kind: BTreeMap<String, u64>,

    /// Count by severity
    pub by_severity: BTreeMap<u8, u64>,

    /// Earliest data timestamp among stored anomalies
    pub first_timestamp: Option<Timestamp>,

    /// Latest data timestamp among stored anomalies
    pub last_timestamp: Option<Timestamp>,

    /// Number of distinct symbols involved
    pub unique_symbols: u64,
}

/// Summary plus the ordered anomaly list, as exported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub summary: AnomalySummary,
    pub anomalies: Vec<Anomaly>,
}

/// Configuration for the anomaly reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyReporterConfig {
    /// Maximum number of anomalies to keep in memory
    pub max_stored: usize,

    /// Whether to emit each anomaly through the `log` facade
    pub log_anomalies: bool,

    /// Minimum severity to log (1=all, 2=medium+, 3=high only)
    pub min_log_severity: u8,
}

impl Default for AnomalyReporterConfig {
    fn default() -> Self {
        Self {
            max_stored: 1_000_000,
            log_anomalies: true,
            min_log_severity: 2,
        }
    }
}

impl AnomalyReporterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_stored(mut self, max_stored: usize) -> Self {
        self.max_stored = max_stored;
        self
    }

    /// Enable/disable anomaly logs.
    pub fn with_logging(mut self, log: bool) -> Self {
        self.log_anomalies = log;
        self
    }

    pub fn with_min_log_severity(mut self, severity: u8) -> Self {
        self.min_log_severity = severity;
        self
    }
}

/// Collects anomalies for one reconstruction run.
#[derive(Debug, Clone)]
pub struct AnomalyReporter {
    config: AnomalyReporterConfig,

    /// Stored anomalies, in observation order
    anomalies: Vec<Anomaly>,

    /// Next ID to assign
    next_id: u64,

    /// Count by kind (covers anomalies past the storage cap)
    kind_counts: AHashMap<AnomalyKind, u64>,

    /// Anomalies counted but not stored
    not_stored: u64,

    /// Symbols seen in anomalies
    symbols: AHashSet<Symbol>,
}

impl AnomalyReporter {
    /// Create a reporter with default configuration.
    pub fn new() -> Self {
        Self::with_config(AnomalyReporterConfig::default())
    }

    pub fn with_config(config: AnomalyReporterConfig) -> Self {
        Self {
            config,
            anomalies: Vec::new(),
            next_id: 1,
            kind_counts: AHashMap::new(),
            not_stored: 0,
            symbols: AHashSet::new(),
        }
    }

    pub fn config(&self) -> &AnomalyReporterConfig {
        &self.config
    }

    /// Record an anomaly, returning its assigned ID.
    pub fn record(&mut self, mut anomaly: Anomaly) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        anomaly.id = id;

        if self.config.log_anomalies && anomaly.kind.severity() >= self.config.min_log_severity {
            log::log!(
                anomaly.kind.log_level(),
                "[{}] #{}: {}",
                anomaly.kind.name(),
                id,
                anomaly.message
            );
        }

        if let Some(symbol) = &anomaly.symbol {
            if !self.symbols.contains(symbol) {
                self.symbols.insert(symbol.clone());
            }
        }

        *self.kind_counts.entry(anomaly.kind).or_insert(0) += 1;

        if self.anomalies.len() < self.config.max_stored {
            self.anomalies.push(anomaly);
        } else {
            self.not_stored += 1;
        }

        id
    }

    /// Record an error as an anomaly.
    pub fn record_error(&mut self, err: &ReconError) -> u64 {
        self.record(Anomaly::from_error(err))
    }

    /// Record an anomaly from its parts.
    pub fn report(
        &mut self,
        kind: AnomalyKind,
        symbol: Option<&Symbol>,
        timestamp: Option<Timestamp>,
        message: impl Into<String>,
    ) -> u64 {
        let mut anomaly = Anomaly::new(kind, message);
        anomaly.symbol = symbol.cloned();
        anomaly.timestamp = timestamp;
        self.record(anomaly)
    }

    /// Append another reporter's anomalies, renumbering them.
    ///
    /// Anomalies are taken in their existing order; callers merging several
    /// partitions sort by `sequence` first.
    pub fn extend(&mut self, anomalies: impl IntoIterator<Item = Anomaly>) {
        for anomaly in anomalies {
            self.record(anomaly);
        }
    }

    /// Take the stored anomalies, leaving counts untouched.
    pub fn drain(&mut self) -> Vec<Anomaly> {
        std::mem::take(&mut self.anomalies)
    }

    /// Number of stored anomalies.
    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    /// Total count, including anomalies past the storage cap.
    pub fn total_count(&self) -> u64 {
        self.kind_counts.values().sum()
    }

    /// Get count for a specific kind.
    pub fn count(&self, kind: AnomalyKind) -> u64 {
        self.kind_counts.get(&kind).copied().unwrap_or(0)
    }

    /// All stored anomalies, in observation order.
    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// Stored anomalies of one kind.
    pub fn of_kind(&self, kind: AnomalyKind) -> impl Iterator<Item = &Anomaly> + '_ {
        self.anomalies.iter().filter(move |a| a.kind == kind)
    }

    /// Get summary statistics.
    pub fn summary(&self) -> AnomalySummary {
        let mut by_kind = BTreeMap::new();
        let mut by_severity = BTreeMap::new();

        for (kind, count) in &self.kind_counts {
            by_kind.insert(kind.name().to_string(), *count);
            *by_severity.entry(kind.severity()).or_insert(0) += *count;
        }

        let timestamps = self.anomalies.iter().filter_map(|a| a.timestamp);
        let first_timestamp = timestamps.clone().min();
        let last_timestamp = timestamps.max();

        AnomalySummary {
            total: self.total_count(),
            not_stored: self.not_stored,
            by_kind,
            by_severity,
            first_timestamp,
            last_timestamp,
            unique_symbols: self.symbols.len() as u64,
        }
    }

    /// Summary plus a copy of the stored list.
    pub fn report_snapshot(&self) -> AnomalyReport {
        AnomalyReport {
            summary: self.summary(),
            anomalies: self.anomalies.clone(),
        }
    }

    /// Serialize the report as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.report_snapshot())?)
    }

    /// Export summary and anomalies to a JSON file.
    pub fn export_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.report_snapshot())?;
        writer.flush()?;
        Ok(())
    }

    /// Export anomalies to CSV (for spreadsheet analysis).
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_csv(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write anomalies as CSV to any writer.
    pub fn write_csv<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(
            writer,
            "id,kind,severity,symbol,timestamp,sequence,message,context"
        )?;

        for anomaly in &self.anomalies {
            let context = anomaly
                .context
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(";");
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{}",
                anomaly.id,
                anomaly.kind.name(),
                anomaly.kind.severity(),
                csv_field(anomaly.symbol.as_ref().map_or("", |s| s.as_str())),
                anomaly
                    .timestamp
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
                anomaly.sequence.map(|s| s.to_string()).unwrap_or_default(),
                csv_field(&anomaly.message),
                csv_field(&context),
            )?;
        }
        Ok(())
    }

    /// Clear all anomalies and counts.
    pub fn clear(&mut self) {
        self.anomalies.clear();
        self.kind_counts.clear();
        self.symbols.clear();
        self.not_stored = 0;
        self.next_id = 1;
    }
}

/// Quote a free-text CSV field, doubling embedded quotes.
fn csv_field(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

impl Default for AnomalyReporter {
    fn default() -> Self {
        Self::new()
    }
}
