//! Price-level book reconstruction.
//!
//! This module maintains exact L2 book state from snapshot/delta depth
//! feeds, one independent book per (symbol, tier), with point-in-time
//! queries over everything applied so far.

pub mod book;
pub mod history;
mod multi_symbol;
pub mod price_level;
pub mod reconstructor;

pub use book::{ApplyOutcome, BookState, DepthView};
pub use history::BookHistory;
pub use multi_symbol::{EngineStats, ReconstructionEngine};
pub use price_level::{BookSide, LevelChange};
pub use reconstructor::{
    ApplyReport, BookReconstructor, BookStatus, ReconstructorConfig, ReconstructorStats,
};
