//! Row source abstraction for feed ingestion.
//!
//! A [`RowSource`] yields typed [`FeedRow`]s, or the error that kept a
//! record from being typed. Reading files and splitting lines is left to the
//! caller; sources here work on records that are already tokenized.
//!
//! # Example
//!
//! ```
//! use l2_book_reconstructor::source::{Feed, RecordSource, RowSource};
//! use l2_book_reconstructor::types::DepthTier;
//!
//! let records = vec![
//!     vec!["1", "BTC/USD", "[[100, 5]]", "[[101, 4]]"],
//!     vec!["noon", "BTC/USD", "[]", "[]"],
//! ];
//! let source = RecordSource::new(Feed::Book(DepthTier::Top10), records);
//!
//! let rows: Vec<_> = source.rows().unwrap().collect();
//! assert!(rows[0].is_ok());
//! assert!(rows[1].is_err());
//! ```
//!
//! # Implementing Custom Sources
//!
//! ```ignore
//! use l2_book_reconstructor::source::{RowSource, SourceMetadata};
//! use l2_book_reconstructor::{FeedRow, Result};
//!
//! struct ChannelSource {
//!     rx: std::sync::mpsc::Receiver<Result<FeedRow>>,
//!     metadata: SourceMetadata,
//! }
//!
//! impl RowSource for ChannelSource {
//!     type RowIter = std::sync::mpsc::IntoIter<Result<FeedRow>>;
//!
//!     fn rows(self) -> Result<Self::RowIter> {
//!         Ok(self.rx.into_iter())
//!     }
//!
//!     fn metadata(&self) -> &SourceMetadata {
//!         &self.metadata
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::rows::{BookRow, FeedRow, RefRow, TradeRow};
use crate::types::DepthTier;

// ============================================================================
// Source Metadata
// ============================================================================

/// Metadata about a row source.
#[derive(Debug, Clone, Default)]
pub struct SourceMetadata {
    /// Which feed the rows come from
    pub feed: Option<Feed>,

    /// Original file path (if loaded from file)
    pub file_path: Option<PathBuf>,

    /// Data provider name (e.g., "memory", "csv")
    pub provider: Option<String>,

    /// Estimated row count (for progress tracking)
    pub estimated_rows: Option<u64>,

    /// File size in bytes (if applicable)
    pub file_size: Option<u64>,
}

impl SourceMetadata {
    /// Create new empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, feed: Feed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_file_path(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_estimated_rows(mut self, count: u64) -> Self {
        self.estimated_rows = Some(count);
        self
    }

    /// Extract metadata from a file path.
    ///
    /// Depth files named `orderbooks-10.csv` or `orderbooks-1000.csv` get
    /// their tier from the trailing depth.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut metadata = Self::new().with_file_path(path);

        if let Ok(meta) = std::fs::metadata(path) {
            metadata.file_size = Some(meta.len());
        }

        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            metadata.feed = stem
                .rsplit_once('-')
                .and_then(|(_, depth)| depth.parse::<u32>().ok())
                .and_then(|depth| DepthTier::from_depth(depth).ok())
                .map(Feed::Book);
        }

        metadata
    }
}

// ============================================================================
// Feeds
// ============================================================================

/// The three input feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    /// Depth feed of one tier
    Book(DepthTier),
    Trade,
    Ref,
}

impl Feed {
    /// Type one tokenized record of this feed.
    pub fn type_record(self, fields: &[&str]) -> Result<FeedRow> {
        Ok(match self {
            Feed::Book(tier) => BookRow::from_fields(tier, fields)?.into(),
            Feed::Trade => TradeRow::from_fields(fields)?.into(),
            Feed::Ref => RefRow::from_fields(fields)?.into(),
        })
    }
}

// ============================================================================
// Row Source Trait
// ============================================================================

/// Trait for row sources.
///
/// - `rows()` consumes `self` to allow single-pass iteration
/// - Each item is one record: `Err` items are reported against that row
///   and skipped, they never stop the run
pub trait RowSource {
    /// The iterator type for rows.
    type RowIter: Iterator<Item = Result<FeedRow>>;

    /// Consume the source and return an iterator over rows.
    ///
    /// An `Err` here means the source as a whole could not be opened.
    fn rows(self) -> Result<Self::RowIter>;

    /// Get metadata about the source.
    fn metadata(&self) -> &SourceMetadata;
}

// ============================================================================
// Vector Source (for testing)
// ============================================================================

/// An in-memory source of already typed rows.
///
/// # Example
///
/// ```
/// use l2_book_reconstructor::source::{RowSource, VecSource};
/// use l2_book_reconstructor::types::RefPrice;
///
/// let quote = RefPrice::from_fields(&["BTC/USD", "5", "99.9", "100.1"]).unwrap();
/// let source = VecSource::new(vec![quote.into()]);
///
/// assert_eq!(source.metadata().estimated_rows, Some(1));
/// assert_eq!(source.rows().unwrap().count(), 1);
/// ```
pub struct VecSource {
    rows: Vec<Result<FeedRow>>,
    metadata: SourceMetadata,
}

impl VecSource {
    /// Create a new vector source.
    pub fn new(rows: Vec<FeedRow>) -> Self {
        Self::from_results(rows.into_iter().map(Ok).collect())
    }

    /// Create a source that also carries row failures.
    pub fn from_results(rows: Vec<Result<FeedRow>>) -> Self {
        Self {
            metadata: SourceMetadata::new()
                .with_provider("memory")
                .with_estimated_rows(rows.len() as u64),
            rows,
        }
    }

    /// Set custom metadata.
    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl RowSource for VecSource {
    type RowIter = std::vec::IntoIter<Result<FeedRow>>;

    fn rows(self) -> Result<Self::RowIter> {
        Ok(self.rows.into_iter())
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }
}

// ============================================================================
// Record Source
// ============================================================================

/// A source over tokenized records of one feed, typed lazily.
pub struct RecordSource<S> {
    feed: Feed,
    records: Vec<Vec<S>>,
    metadata: SourceMetadata,
}

impl<S: AsRef<str>> RecordSource<S> {
    pub fn new(feed: Feed, records: Vec<Vec<S>>) -> Self {
        Self {
            metadata: SourceMetadata::new()
                .with_feed(feed)
                .with_provider("records")
                .with_estimated_rows(records.len() as u64),
            feed,
            records,
        }
    }

    /// Set custom metadata. The feed is kept.
    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata.with_feed(self.feed);
        self
    }

    pub fn feed(&self) -> Feed {
        self.feed
    }
}

impl<S: AsRef<str>> RowSource for RecordSource<S> {
    type RowIter = RecordIter<S>;

    fn rows(self) -> Result<Self::RowIter> {
        Ok(RecordIter {
            feed: self.feed,
            records: self.records.into_iter(),
        })
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }
}

/// Iterator typing one record per step.
pub struct RecordIter<S> {
    feed: Feed,
    records: std::vec::IntoIter<Vec<S>>,
}

impl<S: AsRef<str>> Iterator for RecordIter<S> {
    type Item = Result<FeedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        let fields: Vec<&str> = record.iter().map(AsRef::as_ref).collect();
        Some(self.feed.type_record(&fields))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

// ============================================================================
// Tests
// ============================================================================
