//! Feed metrics tracking.
//!
//! Provides atomic counters for monitoring the streaming feed.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;

/// Metrics for one feed connection.
#[derive(Debug, Default)]
pub struct FeedMetrics {
    messages_received: AtomicU64,
    reconnects: AtomicU64,
    resyncs: AtomicU64,
    duplicates: AtomicU64,
    dropped_events: AtomicU64,
    unroutable: AtomicU64,
    protocol_violations: AtomicU64,
    /// Milliseconds since the epoch of the last frame; zero before any.
    last_message_ms: AtomicI64,
}

impl FeedMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame received.
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.last_message_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Records a completed reconnect.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a resnapshot request.
    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a discarded duplicate delta.
    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an event dropped on a full consumer queue.
    pub fn record_dropped(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a message with no matching subscription.
    pub fn record_unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a feed/book disagreement.
    pub fn record_protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> FeedMetricsSnapshot {
        let last = self.last_message_ms.load(Ordering::Relaxed);
        let since_last_message = if last == 0 {
            None
        } else {
            let elapsed = Utc::now().timestamp_millis().saturating_sub(last).max(0);
            Some(Duration::from_millis(elapsed as u64))
        };

        FeedMetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            since_last_message,
        }
    }
}

/// A point-in-time snapshot of feed metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedMetricsSnapshot {
    /// Frames received.
    pub messages_received: u64,
    /// Reconnects completed.
    pub reconnects: u64,
    /// Resnapshots requested.
    pub resyncs: u64,
    /// Duplicate deltas discarded.
    pub duplicates: u64,
    /// Events dropped on full queues.
    pub dropped_events: u64,
    /// Messages without a subscription.
    pub unroutable: u64,
    /// Feed/book disagreements.
    pub protocol_violations: u64,
    /// Time since the last frame, if any arrived.
    pub since_last_message: Option<Duration>,
}
