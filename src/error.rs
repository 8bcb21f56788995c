//! Error types for book reconstruction and trade correlation.
//!
//! Clean error handling using `thiserror` for ergonomic error definitions.
//! Most of these never escape a replay: the pipeline converts them into
//! anomalies (see [`crate::anomaly`]) and keeps going.

use thiserror::Error;

use crate::types::{DepthTier, StreamKind, Symbol, Timestamp};

/// Result type alias for reconstruction operations.
pub type Result<T> = std::result::Result<T, ReconError>;

/// Main error type for reconstruction operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconError {
    /// Depth-list text could not be decoded into (price, quantity) pairs
    #[error("Decode error for {symbol} at {timestamp}: {reason} (raw: {raw:?})")]
    Decode {
        symbol: Symbol,
        timestamp: Timestamp,
        raw: String,
        reason: String,
    },

    /// Timestamp went backwards within a single (symbol, stream)
    #[error("Ordering error for {symbol} on {stream}: {timestamp} < previous {previous}")]
    Ordering {
        symbol: Symbol,
        stream: StreamKind,
        timestamp: Timestamp,
        previous: Timestamp,
    },

    /// A delta arrived for a book that has not seen a snapshot
    #[error("Missing snapshot for {symbol} tier {tier} at {timestamp}")]
    MissingSnapshot {
        symbol: Symbol,
        tier: DepthTier,
        timestamp: Timestamp,
    },

    /// A tokenized field could not be typed
    #[error("Invalid field {field}={value:?}: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// Wrong number of fields in a tokenized row
    #[error("Expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    /// Depth tier outside the supported set
    #[error("Invalid depth tier: {0}")]
    InvalidTier(u32),

    /// No book has been tracked for this symbol/tier
    #[error("Book not found: {0}")]
    BookNotFound(String),

    /// I/O failure while exporting or loading
    #[error("IO error: {0}")]
    Io(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Generic(String),
}

impl ReconError {
    /// Create a generic error from any string-like type.
    pub fn generic(msg: impl Into<String>) -> Self {
        ReconError::Generic(msg.into())
    }

    /// Shorthand for an [`ReconError::InvalidField`].
    pub fn invalid_field(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ReconError::InvalidField {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for ReconError {
    fn from(err: std::io::Error) -> Self {
        ReconError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ReconError {
    fn from(err: serde_json::Error) -> Self {
        ReconError::Json(err.to_string())
    }
}

impl From<String> for ReconError {
    fn from(err: String) -> Self {
        ReconError::Generic(err)
    }
}

impl From<&str> for ReconError {
    fn from(err: &str) -> Self {
        ReconError::Generic(err.to_string())
    }
}
