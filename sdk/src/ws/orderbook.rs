//! Local order book replica.

use crate::types::{BookView, Ladder, Price, Side};

use super::error::WsError;
use super::messages::{DeltaMessage, SnapshotMessage};

/// In-memory book for one market, built from a snapshot and kept current
/// by sequenced deltas.
///
/// Ladders never hold a zero-size level. Consumers read through
/// [`snapshot_view`](Self::snapshot_view).
#[derive(Debug, Clone)]
pub struct OrderbookReplica {
    ticker: String,
    yes: Ladder,
    no: Ladder,
    sequence: u64,
    synced: bool,
}

impl OrderbookReplica {
    /// Creates an empty, unsynced replica.
    #[must_use]
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            yes: Ladder::new(),
            no: Ladder::new(),
            sequence: 0,
            synced: false,
        }
    }

    /// Returns the market ticker.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Returns the last applied sequence.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns true if the replica tracks the venue.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.synced
    }

    /// Replaces both ladders and the sequence, and marks the book synced.
    ///
    /// # Errors
    ///
    /// Returns `WsError::ProtocolViolation` if the snapshot is crossed. The
    /// ladders are still installed but the replica stays desynced.
    pub fn apply_snapshot(&mut self, snapshot: &SnapshotMessage) -> Result<(), WsError> {
        self.yes = snapshot.yes.clone();
        self.no = snapshot.no.clone();
        self.sequence = snapshot.seq;

        if self.is_crossed() {
            self.synced = false;
            return Err(WsError::ProtocolViolation(format!(
                "{}: snapshot crossed at seq {}",
                self.ticker, snapshot.seq
            )));
        }

        self.synced = true;
        Ok(())
    }

    /// Applies a delta at `sequence + 1`.
    ///
    /// # Errors
    ///
    /// Returns `WsError::SequenceGap` without touching the ladders if the
    /// delta is not the next sequence, and `WsError::ProtocolViolation` if
    /// the book is desynced, the level would go negative, or the result is
    /// crossed. A violation leaves the replica desynced.
    pub fn apply_delta(&mut self, delta: &DeltaMessage) -> Result<(), WsError> {
        if !self.synced {
            return Err(WsError::ProtocolViolation(format!(
                "{}: delta {} on desynced book",
                self.ticker, delta.seq
            )));
        }

        let expected = self.sequence.saturating_add(1);
        if delta.seq != expected {
            return Err(WsError::SequenceGap {
                expected,
                received: delta.seq,
            });
        }

        let ladder = match delta.side {
            Side::Yes => &mut self.yes,
            Side::No => &mut self.no,
        };
        let current = ladder.get(&delta.price).copied().unwrap_or(0);
        let next = i128::from(current) + i128::from(delta.delta);

        if next < 0 || next > i128::from(u64::MAX) {
            self.synced = false;
            return Err(WsError::ProtocolViolation(format!(
                "{}: {} {} size {} {:+} is out of range",
                self.ticker, delta.side, delta.price, current, delta.delta
            )));
        }

        if next == 0 {
            ladder.remove(&delta.price);
        } else {
            ladder.insert(delta.price, next as u64);
        }
        self.sequence = delta.seq;

        if self.is_crossed() {
            self.synced = false;
            return Err(WsError::ProtocolViolation(format!(
                "{}: book crossed at seq {}",
                self.ticker, delta.seq
            )));
        }

        Ok(())
    }

    /// Marks the replica desynced; ladders stay readable.
    pub fn mark_desynced(&mut self) {
        self.synced = false;
    }

    /// Returns the resting size at a level.
    #[must_use]
    pub fn size_at(&self, side: Side, price: Price) -> u64 {
        let ladder = match side {
            Side::Yes => &self.yes,
            Side::No => &self.no,
        };
        ladder.get(&price).copied().unwrap_or(0)
    }

    /// Returns true if the best yes and no bids sum past 100 cents.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.yes.keys().next_back(), self.no.keys().next_back()) {
            (Some(yes), Some(no)) => yes.cents() > no.complement().cents(),
            _ => false,
        }
    }

    /// Returns an immutable copy of the book.
    #[must_use]
    pub fn snapshot_view(&self) -> BookView {
        BookView {
            ticker: self.ticker.clone(),
            yes: self.yes.clone(),
            no: self.no.clone(),
            sequence: self.sequence,
            synced: self.synced,
        }
    }
}
