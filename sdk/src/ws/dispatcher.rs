//! Frame routing and book maintenance.
//!
//! The dispatcher takes decoded server messages in arrival order, routes
//! each to its subscription, runs book messages through the sequence
//! tracker and the replica, and reports follow-up commands for the
//! connection to send.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::error::WsError;
use super::messages::{Channel, DeltaMessage, FeedEvent, ServerMessage, SnapshotMessage};
use super::metrics::FeedMetrics;
use super::orderbook::OrderbookReplica;
use super::sequence::SequenceCheck;
use super::subscription::{Delivery, SubscriptionEntry, SubscriptionKey, SubscriptionRegistry};
use crate::types::BookView;

/// Replicas keyed by ticker, shared with readers.
pub type BookStore = Arc<RwLock<HashMap<String, OrderbookReplica>>>;

/// Command the connection must send after a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// Replace the subscription to obtain a fresh snapshot.
    Resnapshot(SubscriptionKey),
    /// Cancel a server subscription nobody owns anymore.
    Unsubscribe(u64),
}

/// Routes messages to subscriptions and keeps replicas current.
#[derive(Debug)]
pub struct Dispatcher {
    registry: SubscriptionRegistry,
    books: BookStore,
    metrics: Arc<FeedMetrics>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(registry: SubscriptionRegistry, books: BookStore, metrics: Arc<FeedMetrics>) -> Self {
        Self {
            registry,
            books,
            metrics,
        }
    }

    /// Returns the subscription registry.
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Returns the subscription registry mutably.
    pub fn registry_mut(&mut self) -> &mut SubscriptionRegistry {
        &mut self.registry
    }

    /// Marks every replica desynced and forgets connection state.
    pub async fn reset_connection(&mut self) {
        self.registry.reset_connection();
        for book in self.books.write().await.values_mut() {
            book.mark_desynced();
        }
    }

    /// Drops the replica for a ticker.
    pub async fn remove_book(&mut self, ticker: &str) {
        self.books.write().await.remove(ticker);
    }

    /// Releases every subscription and drops all replicas.
    pub async fn clear(&mut self) {
        self.registry.clear();
        self.books.write().await.clear();
    }

    /// Handles one decoded message.
    ///
    /// Returns a follow-up when the connection must resubscribe or cancel
    /// a stray server subscription.
    pub async fn dispatch(&mut self, message: ServerMessage) -> Option<FollowUp> {
        match message {
            ServerMessage::Subscribed { id, sid, channel } => {
                let Some(id) = id else {
                    debug!(sid, "subscribed reply without command id");
                    return None;
                };
                match self.registry.confirm(id, sid) {
                    Some(key) => {
                        info!(channel = %key.channel, ticker = %key.ticker, sid, "subscribed");
                        None
                    }
                    None => {
                        debug!(id, sid, channel = ?channel, "subscription no longer wanted");
                        Some(FollowUp::Unsubscribe(sid))
                    }
                }
            }
            ServerMessage::Unsubscribed { sid, .. } => {
                debug!(sid, "unsubscribed");
                None
            }
            ServerMessage::Ok { id } => {
                debug!(id = ?id, "command acknowledged");
                None
            }
            ServerMessage::Error { id, code, message } => {
                warn!(id = ?id, code, message = %message, "server error");
                let entry = match id {
                    Some(id) => self.registry.fail(id),
                    None => None,
                };
                if let Some(entry) = entry {
                    let key = entry.handle().key().clone();
                    info!(channel = %key.channel, ticker = %key.ticker, "subscription refused");
                    let _ = entry.deliver(FeedEvent::Error { code, message });
                    entry.close();
                    if key.channel.is_book() {
                        self.remove_book(&key.ticker).await;
                    }
                }
                None
            }
            ServerMessage::OrderbookSnapshot(snapshot) => self.on_snapshot(snapshot).await,
            ServerMessage::OrderbookDelta(delta) => self.on_delta(delta).await,
            ServerMessage::Ticker(m) => {
                self.forward(Channel::Ticker, &m.market_ticker.clone(), m.sid, FeedEvent::Ticker(m));
                None
            }
            ServerMessage::Trade(m) => {
                self.forward(Channel::Trade, &m.market_ticker.clone(), m.sid, FeedEvent::Trade(m));
                None
            }
            ServerMessage::Fill(m) => {
                self.forward(Channel::Fill, &m.market_ticker.clone(), m.sid, FeedEvent::Fill(m));
                None
            }
            ServerMessage::HeartbeatAck => None,
            ServerMessage::Unknown(kind) => {
                debug!(kind = %kind, "ignoring unknown message type");
                None
            }
        }
    }

    fn forward(&mut self, channel: Channel, ticker: &str, sid: u64, event: FeedEvent) {
        let metrics = Arc::clone(&self.metrics);
        match self.registry.route(channel, ticker, sid) {
            Some(entry) => deliver(entry, event, &metrics),
            None => unroutable(&metrics, channel, ticker, sid),
        }
    }

    async fn on_snapshot(&mut self, snapshot: SnapshotMessage) -> Option<FollowUp> {
        let Some(entry) = self
            .registry
            .route(Channel::OrderbookDelta, &snapshot.market_ticker, snapshot.sid)
        else {
            unroutable(&self.metrics, Channel::OrderbookDelta, &snapshot.market_ticker, snapshot.sid);
            return None;
        };

        let key = entry.handle().key().clone();
        let result = {
            let mut books = self.books.write().await;
            let book = books
                .entry(key.ticker.clone())
                .or_insert_with(|| OrderbookReplica::new(key.ticker.clone()));
            book.apply_snapshot(&snapshot).map(|()| {
                entry.tracker.reset(snapshot.seq);
                book.snapshot_view()
            })
        };

        match result {
            Ok(view) => {
                debug!(ticker = %key.ticker, sid = snapshot.sid, seq = snapshot.seq, "book snapshot applied");
                deliver(entry, FeedEvent::Snapshot(view), &self.metrics);
                None
            }
            Err(err) => {
                entry.tracker.desync();
                self.metrics.record_protocol_violation();
                warn!(ticker = %key.ticker, seq = snapshot.seq, error = %err, "resnapshotting");
                Some(FollowUp::Resnapshot(key))
            }
        }
    }

    async fn on_delta(&mut self, delta: DeltaMessage) -> Option<FollowUp> {
        let metrics = Arc::clone(&self.metrics);
        let Some(entry) = self
            .registry
            .route(Channel::OrderbookDelta, &delta.market_ticker, delta.sid)
        else {
            unroutable(&metrics, Channel::OrderbookDelta, &delta.market_ticker, delta.sid);
            return None;
        };
        let key = entry.handle().key().clone();

        match entry.tracker.observe(delta.seq) {
            SequenceCheck::Apply => {}
            SequenceCheck::Duplicate => {
                metrics.record_duplicate();
                debug!(ticker = %key.ticker, seq = delta.seq, "discarding duplicate delta");
                return None;
            }
            SequenceCheck::NotSynced => {
                debug!(ticker = %key.ticker, seq = delta.seq, "discarding delta while desynced");
                return None;
            }
            SequenceCheck::Gap { expected, received } => {
                let err = WsError::SequenceGap { expected, received };
                warn!(ticker = %key.ticker, sid = delta.sid, error = %err, "resnapshotting");
                self.desync_book(&key.ticker).await;
                return Some(FollowUp::Resnapshot(key));
            }
        }

        let result: Result<BookView, WsError> = {
            let mut books = self.books.write().await;
            match books.get_mut(&key.ticker) {
                Some(book) => book.apply_delta(&delta).map(|()| {
                    entry.tracker.advance(delta.seq);
                    book.snapshot_view()
                }),
                None => Err(WsError::ProtocolViolation(format!(
                    "{}: delta {} without a book",
                    key.ticker, delta.seq
                ))),
            }
        };

        match result {
            Ok(book) => {
                deliver(entry, FeedEvent::Delta { delta, book }, &metrics);
                None
            }
            Err(err) => {
                entry.tracker.desync();
                metrics.record_protocol_violation();
                warn!(ticker = %key.ticker, seq = delta.seq, error = %err, "resnapshotting");
                self.desync_book(&key.ticker).await;
                Some(FollowUp::Resnapshot(key))
            }
        }
    }

    async fn desync_book(&self, ticker: &str) {
        if let Some(book) = self.books.write().await.get_mut(ticker) {
            book.mark_desynced();
        }
    }
}

fn deliver(entry: &SubscriptionEntry, event: FeedEvent, metrics: &FeedMetrics) {
    match entry.deliver(event) {
        Delivery::Delivered => {}
        Delivery::Dropped => {
            metrics.record_dropped();
            debug!(key = %entry.handle().key(), "consumer queue full, event dropped");
        }
        Delivery::Closed => {
            debug!(key = %entry.handle().key(), "consumer gone, event dropped");
        }
    }
}

fn unroutable(metrics: &FeedMetrics, channel: Channel, ticker: &str, sid: u64) {
    metrics.record_unroutable();
    debug!(channel = %channel, ticker = %ticker, sid, "dropping unroutable message");
}
