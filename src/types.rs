//! Core data types for depth feeds, trades and book state.
//!
//! These types are designed to be:
//! - Exact (prices, quantities and timestamps are decimals, never floats)
//! - Cheap to compare and order (used as `BTreeMap` keys and sort keys)
//! - Serializable, so reconstructed output can be persisted by the caller

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};

/// Parse a decimal the way feed text writes it (`100.5`, `1e-3`, `"2"`).
pub(crate) fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .ok()
        .or_else(|| Decimal::from_scientific(text).ok())
}

// ============================================================================
// Symbol
// ============================================================================

/// Opaque instrument identifier (e.g. `"BTC/USD"`).
///
/// The set of symbols is discovered from the input; nothing in the crate
/// assumes a fixed universe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol from any string-like value.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// Borrow the symbol text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Timestamp
// ============================================================================

/// Feed timestamp, kept in the feed's native unit as an exact decimal.
///
/// Feeds write epoch values such as `1692921600.123456`; parsing them as
/// floats would make ties across streams depend on rounding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(Decimal);

impl Timestamp {
    /// Wrap a decimal value.
    #[inline]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// The underlying decimal value.
    #[inline]
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Forward distance from `earlier` to `self`, `None` on overflow.
    #[inline]
    pub fn checked_since(&self, earlier: Timestamp) -> Option<Decimal> {
        self.0.checked_sub(earlier.0)
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl From<Decimal> for Timestamp {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl FromStr for Timestamp {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        parse_decimal(s)
            .map(Self)
            .ok_or_else(|| ReconError::invalid_field("timestamp", s, "not a number"))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

// ============================================================================
// Depth tier and stream identity
// ============================================================================

/// Depth limit of a book feed.
///
/// Each tier is an independent logical book with its own snapshot
/// lifecycle; the two are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DepthTier {
    /// Top 10 levels per side
    #[serde(rename = "10")]
    Top10,
    /// Top 1000 levels per side
    #[serde(rename = "1000")]
    Top1000,
}

impl DepthTier {
    /// All supported tiers.
    pub const ALL: [DepthTier; 2] = [DepthTier::Top10, DepthTier::Top1000];

    /// Number of levels per side published by this feed.
    #[inline]
    pub fn depth(self) -> u32 {
        match self {
            DepthTier::Top10 => 10,
            DepthTier::Top1000 => 1000,
        }
    }

    /// Map a published depth back to a tier.
    pub fn from_depth(depth: u32) -> Result<Self> {
        match depth {
            10 => Ok(DepthTier::Top10),
            1000 => Ok(DepthTier::Top1000),
            other => Err(ReconError::InvalidTier(other)),
        }
    }
}

impl FromStr for DepthTier {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        let depth: u32 = s
            .trim()
            .parse()
            .map_err(|_| ReconError::invalid_field("tier", s, "not an integer"))?;
        Self::from_depth(depth)
    }
}

impl fmt::Display for DepthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.depth())
    }
}

/// Source stream of an event.
///
/// Each book tier is its own stream: ordering is checked per
/// (symbol, stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamKind {
    /// Reference-price feed
    Ref,
    /// Depth feed at one tier
    Book(DepthTier),
    /// Executed trades
    Trade,
}

impl StreamKind {
    /// Tie-break rank for events sharing a timestamp (lower sorts first).
    ///
    /// Reference prices sort before book updates, which sort before trades,
    /// so a trade is correlated against context carrying its own timestamp.
    /// The feeds carry no cross-stream sequence numbers; this order is a
    /// policy, not something recovered from the input.
    #[inline]
    pub fn priority(self) -> u8 {
        match self {
            StreamKind::Ref => 0,
            StreamKind::Book(_) => 1,
            StreamKind::Trade => 2,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Ref => f.write_str("ref"),
            StreamKind::Book(tier) => write!(f, "book-{tier}"),
            StreamKind::Trade => f.write_str("trade"),
        }
    }
}

// ============================================================================
// Sides
// ============================================================================

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy interest, best = highest price
    Bid,
    /// Sell interest, best = lowest price
    Ask,
}

impl Side {
    /// The other side of the book.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Check if this is a bid.
    #[inline(always)]
    pub fn is_bid(self) -> bool {
        matches!(self, Side::Bid)
    }

    /// Check if this is an ask.
    #[inline(always)]
    pub fn is_ask(self) -> bool {
        matches!(self, Side::Ask)
    }
}

impl FromStr for Side {
    type Err = ReconError;

    /// Accepts `bid`/`buy` and `ask`/`sell`, case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bid" | "bids" | "buy" | "b" => Ok(Side::Bid),
            "ask" | "asks" | "sell" | "s" | "a" => Ok(Side::Ask),
            _ => Err(ReconError::invalid_field("side", s, "expected bid/buy or ask/sell")),
        }
    }
}

/// Aggressor of an executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TakerSide {
    /// Taker lifted the offer
    Buy,
    /// Taker hit the bid
    Sell,
}

impl TakerSide {
    /// Book side whose resting liquidity this taker consumed.
    #[inline]
    pub fn consumed_side(self) -> Side {
        match self {
            TakerSide::Buy => Side::Ask,
            TakerSide::Sell => Side::Bid,
        }
    }
}

impl FromStr for TakerSide {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" | "bid" => Ok(TakerSide::Buy),
            "sell" | "s" | "ask" => Ok(TakerSide::Sell),
            _ => Err(ReconError::invalid_field("taker_side", s, "expected buy or sell")),
        }
    }
}

// ============================================================================
// Levels and events
// ============================================================================

/// One (price, quantity) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    /// Create a new level.
    #[inline]
    pub const fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }

    /// Price × quantity, `None` when out of `Decimal` range.
    #[inline]
    pub fn notional(&self) -> Option<Decimal> {
        self.price.checked_mul(self.quantity)
    }
}

/// Book consistency status after validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookConsistency {
    /// Book is valid: best_bid < best_ask
    Valid,
    /// Book is empty (no quotes on one or both sides)
    #[default]
    Empty,
    /// Book is locked: best_bid == best_ask
    Locked,
    /// Book is crossed: best_bid > best_ask
    Crossed,
}

impl BookConsistency {
    /// Classify a pair of best prices.
    pub fn classify(best_bid: Option<Decimal>, best_ask: Option<Decimal>) -> Self {
        match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => {
                if bid < ask {
                    BookConsistency::Valid
                } else if bid == ask {
                    BookConsistency::Locked
                } else {
                    BookConsistency::Crossed
                }
            }
            _ => BookConsistency::Empty,
        }
    }

    /// Returns true if the book state is valid for analysis.
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self, BookConsistency::Valid)
    }

    /// Best bid ≥ best ask (locked counts).
    #[inline]
    pub fn is_crossed_or_locked(&self) -> bool {
        matches!(self, BookConsistency::Crossed | BookConsistency::Locked)
    }

    /// Returns true if the book is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, BookConsistency::Empty)
    }
}

/// Whether a book row replaces or amends the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookEventKind {
    Snapshot,
    Delta,
}

/// A decoded depth update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BookEvent {
    /// Full replacement of both sides
    Snapshot {
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    },
    /// Upserts; quantity 0 removes the price
    Delta {
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    },
}

impl BookEvent {
    /// Build an event of the given kind.
    pub fn new(kind: BookEventKind, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        match kind {
            BookEventKind::Snapshot => BookEvent::Snapshot { bids, asks },
            BookEventKind::Delta => BookEvent::Delta { bids, asks },
        }
    }

    #[inline]
    pub fn kind(&self) -> BookEventKind {
        match self {
            BookEvent::Snapshot { .. } => BookEventKind::Snapshot,
            BookEvent::Delta { .. } => BookEventKind::Delta,
        }
    }

    #[inline]
    pub fn is_snapshot(&self) -> bool {
        matches!(self, BookEvent::Snapshot { .. })
    }

    #[inline]
    pub fn bids(&self) -> &[PriceLevel] {
        match self {
            BookEvent::Snapshot { bids, .. } | BookEvent::Delta { bids, .. } => bids,
        }
    }

    #[inline]
    pub fn asks(&self) -> &[PriceLevel] {
        match self {
            BookEvent::Snapshot { asks, .. } | BookEvent::Delta { asks, .. } => asks,
        }
    }
}

/// A book event addressed to one (symbol, tier) at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub symbol: Symbol,
    pub tier: DepthTier,
    pub timestamp: Timestamp,
    pub event: BookEvent,
}

/// An executed trade, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: Symbol,
    pub timestamp: Timestamp,
    pub taker_side: TakerSide,
    pub price: Decimal,
    pub amount: Decimal,
    /// Reference bid published alongside the trade
    pub ref_bid: Option<Decimal>,
    /// Reference ask published alongside the trade
    pub ref_ask: Option<Decimal>,
    pub usd_rate: Option<Decimal>,
}

impl Trade {
    /// Price × amount, `None` when out of `Decimal` range.
    #[inline]
    pub fn notional(&self) -> Option<Decimal> {
        self.price.checked_mul(self.amount)
    }

    /// Notional converted with the trade's USD rate, when present.
    pub fn notional_usd(&self) -> Option<Decimal> {
        self.notional()?.checked_mul(self.usd_rate?)
    }
}

/// A standalone reference quote, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefPrice {
    pub symbol: Symbol,
    pub timestamp: Timestamp,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
}

impl RefPrice {
    /// Midpoint of the reference quote, `None` when out of `Decimal` range.
    #[inline]
    pub fn mid(&self) -> Option<Decimal> {
        self.bid_price
            .checked_add(self.ask_price)
            .map(|sum| sum / Decimal::TWO)
    }
}

/// One event of the merged, time-ordered sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Ref(Arc<RefPrice>),
    Book(BookUpdate),
    Trade(Arc<Trade>),
}

impl MarketEvent {
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        match self {
            MarketEvent::Ref(r) => r.timestamp,
            MarketEvent::Book(b) => b.timestamp,
            MarketEvent::Trade(t) => t.timestamp,
        }
    }

    #[inline]
    pub fn symbol(&self) -> &Symbol {
        match self {
            MarketEvent::Ref(r) => &r.symbol,
            MarketEvent::Book(b) => &b.symbol,
            MarketEvent::Trade(t) => &t.symbol,
        }
    }

    #[inline]
    pub fn stream(&self) -> StreamKind {
        match self {
            MarketEvent::Ref(_) => StreamKind::Ref,
            MarketEvent::Book(b) => StreamKind::Book(b.tier),
            MarketEvent::Trade(_) => StreamKind::Trade,
        }
    }
}
