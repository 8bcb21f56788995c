//! Typed rows of the three input feeds.
//!
//! File access and splitting a line into fields happen outside this crate;
//! what arrives here is one tokenized record per row. `from_fields` types a
//! record, and any failure is reported against that row alone.
//!
//! Book rows keep their depth lists as raw text: decoding is a separate
//! step so that a bad list becomes a decode error with full context rather
//! than a malformed row.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};
use crate::types::{
    parse_decimal, BookEventKind, DepthTier, RefPrice, StreamKind, Symbol, TakerSide, Timestamp,
    Trade,
};

/// Trade feed row.
pub type TradeRow = Trade;

/// Reference-price feed row.
pub type RefRow = RefPrice;

/// Whether a book row is a snapshot or a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookRowKind {
    Snapshot,
    Delta,
    /// Not marked in the feed: the first row of a (symbol, tier) is the
    /// snapshot, every later row a delta
    Inferred,
}

impl BookRowKind {
    /// Resolve against whether the book already accepted a row.
    #[inline]
    pub fn resolve(self, book_seen: bool) -> BookEventKind {
        match self {
            BookRowKind::Snapshot => BookEventKind::Snapshot,
            BookRowKind::Delta => BookEventKind::Delta,
            BookRowKind::Inferred if book_seen => BookEventKind::Delta,
            BookRowKind::Inferred => BookEventKind::Snapshot,
        }
    }
}

impl FromStr for BookRowKind {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" | "snap" | "s" => Ok(BookRowKind::Snapshot),
            "delta" | "diff" | "update" | "d" => Ok(BookRowKind::Delta),
            "" => Ok(BookRowKind::Inferred),
            _ => Err(ReconError::invalid_field(
                "kind",
                s,
                "expected snapshot or delta",
            )),
        }
    }
}

/// Depth feed row, depth lists still encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRow {
    pub timestamp: Timestamp,
    pub symbol: Symbol,
    pub tier: DepthTier,
    pub bids_raw: String,
    pub asks_raw: String,
    pub kind: BookRowKind,
}

impl BookRow {
    /// Type one depth-feed record for a file of the given tier.
    ///
    /// Columns: `time, symbol, bids, asks[, kind]`. Without the `kind`
    /// column the row kind is [`BookRowKind::Inferred`].
    pub fn from_fields(tier: DepthTier, fields: &[&str]) -> Result<Self> {
        expect_fields(fields, 4, 5)?;
        let kind = match fields.get(4) {
            Some(kind) => kind.parse()?,
            None => BookRowKind::Inferred,
        };
        Ok(Self {
            timestamp: fields[0].parse()?,
            symbol: parse_symbol(fields[1])?,
            tier,
            bids_raw: fields[2].trim().to_string(),
            asks_raw: fields[3].trim().to_string(),
            kind,
        })
    }
}

impl Trade {
    /// Type one trade-feed record.
    ///
    /// Columns: `symbol, taker_side, price, amount, timestamp, ref_bid,
    /// ref_ask, usd_rate`. The last three may be blank or omitted.
    pub fn from_fields(fields: &[&str]) -> Result<Self> {
        expect_fields(fields, 5, 8)?;
        Ok(Self {
            symbol: parse_symbol(fields[0])?,
            taker_side: fields[1].parse::<TakerSide>()?,
            price: required_decimal("price", fields[2])?,
            amount: required_decimal("amount", fields[3])?,
            timestamp: fields[4].parse()?,
            ref_bid: optional_decimal("ref_bid", fields.get(5).copied())?,
            ref_ask: optional_decimal("ref_ask", fields.get(6).copied())?,
            usd_rate: optional_decimal("usd_rate", fields.get(7).copied())?,
        })
    }
}

impl RefPrice {
    /// Type one reference-feed record.
    ///
    /// Columns: `symbol, timestamp, bid_price, ask_price`.
    pub fn from_fields(fields: &[&str]) -> Result<Self> {
        expect_fields(fields, 4, 4)?;
        Ok(Self {
            symbol: parse_symbol(fields[0])?,
            timestamp: fields[1].parse()?,
            bid_price: required_decimal("bid_price", fields[2])?,
            ask_price: required_decimal("ask_price", fields[3])?,
        })
    }
}

/// One row from any of the three feeds.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedRow {
    Book(BookRow),
    Trade(Arc<TradeRow>),
    Ref(Arc<RefRow>),
}

impl FeedRow {
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        match self {
            FeedRow::Book(row) => row.timestamp,
            FeedRow::Trade(row) => row.timestamp,
            FeedRow::Ref(row) => row.timestamp,
        }
    }

    #[inline]
    pub fn symbol(&self) -> &Symbol {
        match self {
            FeedRow::Book(row) => &row.symbol,
            FeedRow::Trade(row) => &row.symbol,
            FeedRow::Ref(row) => &row.symbol,
        }
    }

    #[inline]
    pub fn stream(&self) -> StreamKind {
        match self {
            FeedRow::Book(row) => StreamKind::Book(row.tier),
            FeedRow::Trade(_) => StreamKind::Trade,
            FeedRow::Ref(_) => StreamKind::Ref,
        }
    }
}

impl From<BookRow> for FeedRow {
    fn from(row: BookRow) -> Self {
        FeedRow::Book(row)
    }
}

impl From<TradeRow> for FeedRow {
    fn from(row: TradeRow) -> Self {
        FeedRow::Trade(Arc::new(row))
    }
}

impl From<RefRow> for FeedRow {
    fn from(row: RefRow) -> Self {
        FeedRow::Ref(Arc::new(row))
    }
}

fn expect_fields(fields: &[&str], min: usize, max: usize) -> Result<()> {
    if fields.len() < min {
        return Err(ReconError::FieldCount {
            expected: min,
            actual: fields.len(),
        });
    }
    if fields.len() > max {
        return Err(ReconError::FieldCount {
            expected: max,
            actual: fields.len(),
        });
    }
    Ok(())
}

fn parse_symbol(text: &str) -> Result<Symbol> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ReconError::invalid_field("symbol", text, "empty"));
    }
    Ok(Symbol::new(text))
}

fn required_decimal(field: &'static str, text: &str) -> Result<Decimal> {
    parse_decimal(text).ok_or_else(|| ReconError::invalid_field(field, text, "not a number"))
}

fn optional_decimal(field: &'static str, text: Option<&str>) -> Result<Option<Decimal>> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => required_decimal(field, text).map(Some),
    }
}
