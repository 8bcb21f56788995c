//! Checkpointed event log for point-in-time book queries.
//!
//! Every applied event is appended to an arena ordered by
//! (timestamp, update_seq). Every `checkpoint_interval` events a full copy of
//! the book is kept. A query binary-searches the arena for the last event at
//! or before the requested time, clones the nearest prior checkpoint and
//! replays at most `checkpoint_interval - 1` events on top of it.

use std::borrow::Cow;

use super::book::BookState;
use crate::types::{BookEvent, Timestamp};

/// One applied event.
#[derive(Debug, Clone)]
struct LoggedEvent {
    timestamp: Timestamp,
    event: BookEvent,
}

/// Full book copy taken after applying the event at `index`.
#[derive(Debug, Clone)]
struct Checkpoint {
    index: usize,
    state: BookState,
}

/// Point-in-time history of one (symbol, tier) book.
#[derive(Debug, Clone)]
pub struct BookHistory {
    checkpoint_interval: usize,
    events: Vec<LoggedEvent>,
    checkpoints: Vec<Checkpoint>,
}

impl BookHistory {
    /// Create an empty history. An interval of 0 is treated as 1.
    pub fn new(checkpoint_interval: usize) -> Self {
        Self {
            checkpoint_interval: checkpoint_interval.max(1),
            events: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    /// Append an event that was just applied to `state_after`.
    ///
    /// Timestamps must be non-decreasing; the reconstructor rejects
    /// regressions before they reach the log.
    pub fn record(&mut self, state_after: &BookState, event: &BookEvent) {
        debug_assert!(
            self.events
                .last()
                .map_or(true, |last| last.timestamp <= state_after.timestamp),
            "BookHistory requires non-decreasing timestamps"
        );

        let index = self.events.len();
        self.events.push(LoggedEvent {
            timestamp: state_after.timestamp,
            event: event.clone(),
        });

        // Snapshots restart the book, so they are free checkpoints to replay from.
        if index % self.checkpoint_interval == 0 || event.is_snapshot() {
            log::debug!(
                "Checkpoint {} for {} tier {} at {} (seq {})",
                self.checkpoints.len(),
                state_after.symbol,
                state_after.tier,
                state_after.timestamp,
                state_after.update_seq
            );
            self.checkpoints.push(Checkpoint {
                index,
                state: state_after.clone(),
            });
        }
    }

    /// Book state with the greatest timestamp ≤ `at` (latest event among
    /// equal timestamps), or `None` if nothing was applied by then.
    ///
    /// `live` must be the book after the last recorded event; queries that
    /// land on it borrow instead of replaying.
    pub fn state_as_of<'a>(&self, at: Timestamp, live: &'a BookState) -> Option<Cow<'a, BookState>> {
        let end = self.events.partition_point(|e| e.timestamp <= at);
        if end == 0 {
            return None;
        }
        let target = end - 1;
        if target + 1 == self.events.len() {
            return Some(Cow::Borrowed(live));
        }

        let cp = self.checkpoints.partition_point(|c| c.index <= target);
        // index 0 is always a checkpoint, so cp >= 1 here
        let checkpoint = &self.checkpoints[cp.checked_sub(1)?];

        let mut state = checkpoint.state.clone();
        for logged in &self.events[checkpoint.index + 1..=target] {
            state.apply(logged.timestamp, &logged.event);
        }
        Some(Cow::Owned(state))
    }

    /// Timestamp of the oldest recorded event.
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.events.first().map(|e| e.timestamp)
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of full book copies held.
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval
    }

    /// Drop all events and checkpoints.
    pub fn clear(&mut self) {
        self.events.clear();
        self.checkpoints.clear();
    }
}
