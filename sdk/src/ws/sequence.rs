//! Sequence tracking for sequenced feed channels.
//!
//! A tracker accepts exactly `last + 1`, silently drops anything at or
//! below `last`, and desynchronizes on a gap until the next snapshot sets a
//! new baseline.

/// Synchronization state of one (channel, ticker) stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No baseline yet: fresh subscription or reconnect.
    #[default]
    AwaitingSnapshot,
    /// Baseline established; `last` is the last applied sequence.
    Synced {
        /// Last applied sequence.
        last: u64,
    },
    /// Gap or inconsistency seen; waiting for a resnapshot.
    Desynced {
        /// Last sequence applied before desynchronizing.
        last: u64,
    },
}

/// Outcome of checking an incoming delta's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Exactly `last + 1`; apply, then call [`SequenceTracker::advance`].
    Apply,
    /// At or below `last`; discard.
    Duplicate,
    /// Ahead of `last + 1`; the tracker is now desynced.
    Gap {
        /// Sequence that would have been accepted.
        expected: u64,
        /// Sequence that arrived.
        received: u64,
    },
    /// No baseline; discard until a snapshot arrives.
    NotSynced,
}

/// Per-stream sequence validator.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    state: SyncState,
    duplicates: u64,
    gaps: u64,
}

impl SequenceTracker {
    /// Creates a tracker awaiting its first snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    /// Returns true if deltas are being accepted.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        matches!(self.state, SyncState::Synced { .. })
    }

    /// Returns the last applied sequence, if a baseline was ever set.
    #[must_use]
    pub const fn last(&self) -> Option<u64> {
        match self.state {
            SyncState::AwaitingSnapshot => None,
            SyncState::Synced { last } | SyncState::Desynced { last } => Some(last),
        }
    }

    /// Number of duplicate or stale deltas discarded.
    #[must_use]
    pub const fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Number of gaps detected.
    #[must_use]
    pub const fn gaps(&self) -> u64 {
        self.gaps
    }

    /// Classifies an incoming delta sequence.
    ///
    /// A gap moves the tracker to `Desynced`. Nothing else changes state;
    /// an accepted sequence is recorded by [`advance`](Self::advance) once
    /// the delta has been applied.
    pub fn observe(&mut self, seq: u64) -> SequenceCheck {
        match self.state {
            SyncState::AwaitingSnapshot | SyncState::Desynced { .. } => SequenceCheck::NotSynced,
            SyncState::Synced { last } => {
                let expected = last.saturating_add(1);
                if seq == expected {
                    SequenceCheck::Apply
                } else if seq <= last {
                    self.duplicates = self.duplicates.saturating_add(1);
                    SequenceCheck::Duplicate
                } else {
                    self.gaps = self.gaps.saturating_add(1);
                    self.state = SyncState::Desynced { last };
                    SequenceCheck::Gap {
                        expected,
                        received: seq,
                    }
                }
            }
        }
    }

    /// Records an applied sequence.
    ///
    /// Ignored unless `seq` is exactly `last + 1` on a synced tracker.
    pub fn advance(&mut self, seq: u64) {
        if let SyncState::Synced { last } = self.state {
            if seq == last.saturating_add(1) {
                self.state = SyncState::Synced { last: seq };
            }
        }
    }

    /// Sets a new baseline from a snapshot, unconditionally.
    pub fn reset(&mut self, seq: u64) {
        self.state = SyncState::Synced { last: seq };
    }

    /// Stops accepting deltas until the next snapshot.
    pub fn desync(&mut self) {
        self.state = match self.state {
            SyncState::Synced { last } | SyncState::Desynced { last } => SyncState::Desynced { last },
            SyncState::AwaitingSnapshot => SyncState::AwaitingSnapshot,
        };
    }

    /// Forgets the baseline entirely, as after a reconnect.
    pub fn clear(&mut self) {
        self.state = SyncState::AwaitingSnapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced_at(seq: u64) -> SequenceTracker {
        let mut tracker = SequenceTracker::new();
        tracker.reset(seq);
        tracker
    }

    #[test]
    fn test_tracker_new_awaits_snapshot() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.state(), SyncState::AwaitingSnapshot);
        assert_eq!(tracker.observe(1), SequenceCheck::NotSynced);
        assert!(tracker.last().is_none());
    }

    #[test]
    fn test_tracker_accepts_next() {
        let mut tracker = synced_at(100);
        assert_eq!(tracker.observe(101), SequenceCheck::Apply);
        tracker.advance(101);
        assert_eq!(tracker.last(), Some(101));
        assert_eq!(tracker.observe(102), SequenceCheck::Apply);
    }

    #[test]
    fn test_tracker_observe_does_not_advance() {
        let mut tracker = synced_at(100);
        assert_eq!(tracker.observe(101), SequenceCheck::Apply);
        assert_eq!(tracker.last(), Some(100));
    }

    #[test]
    fn test_tracker_discards_duplicate_and_stale() {
        let mut tracker = synced_at(100);
        assert_eq!(tracker.observe(100), SequenceCheck::Duplicate);
        assert_eq!(tracker.observe(42), SequenceCheck::Duplicate);
        assert!(tracker.is_synced());
        assert_eq!(tracker.duplicates(), 2);
    }

    #[test]
    fn test_tracker_gap_desyncs() {
        let mut tracker = synced_at(101);
        assert_eq!(
            tracker.observe(103),
            SequenceCheck::Gap {
                expected: 102,
                received: 103
            }
        );
        assert_eq!(tracker.state(), SyncState::Desynced { last: 101 });
        assert_eq!(tracker.observe(102), SequenceCheck::NotSynced);
        assert_eq!(tracker.gaps(), 1);
    }

    #[test]
    fn test_tracker_snapshot_resets_unconditionally() {
        let mut tracker = synced_at(500);
        tracker.desync();
        tracker.reset(7);
        assert_eq!(tracker.state(), SyncState::Synced { last: 7 });
        assert_eq!(tracker.observe(8), SequenceCheck::Apply);
    }

    #[test]
    fn test_tracker_advance_ignores_out_of_order() {
        let mut tracker = synced_at(10);
        tracker.advance(12);
        assert_eq!(tracker.last(), Some(10));
        tracker.desync();
        tracker.advance(11);
        assert_eq!(tracker.state(), SyncState::Desynced { last: 10 });
    }

    #[test]
    fn test_tracker_clear() {
        let mut tracker = synced_at(10);
        tracker.clear();
        assert_eq!(tracker.state(), SyncState::AwaitingSnapshot);
        tracker.desync();
        assert_eq!(tracker.state(), SyncState::AwaitingSnapshot);
    }
}
