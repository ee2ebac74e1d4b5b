//! Subscription registry.
//!
//! Maps each (channel, ticker) pair to its consumer queue, its current
//! server subscription id and its sequence tracker. The registry outlives
//! individual connections; on reconnect every entry is re-issued.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::messages::{Channel, FeedEvent};
use super::sequence::SequenceTracker;

/// Identity of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    /// Channel.
    pub channel: Channel,
    /// Market ticker, upper case.
    pub ticker: String,
}

impl SubscriptionKey {
    /// Creates a key, normalizing the ticker to upper case.
    #[must_use]
    pub fn new(channel: Channel, ticker: &str) -> Self {
        Self {
            channel,
            ticker: ticker.trim().to_uppercase(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.ticker)
    }
}

/// Consumer side of a subscription.
///
/// Clones share one queue. Once the subscription is removed or the feed
/// shuts down, [`recv`](Self::recv) returns `None` and no further events are
/// delivered. A subscription the venue refuses ends after its
/// [`FeedEvent::Error`] has been read.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    key: SubscriptionKey,
    generation: u64,
    receiver: Arc<Mutex<mpsc::Receiver<FeedEvent>>>,
    cancel: CancellationToken,
    refused: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Returns the subscription key.
    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Returns the channel.
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.key.channel
    }

    /// Returns the ticker.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.key.ticker
    }

    /// Returns the registration this handle belongs to.
    ///
    /// Re-subscribing a removed key yields a handle with a new generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true once the subscription has been released or refused.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.refused.load(Ordering::Acquire)
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the subscription is released.
    pub async fn recv(&self) -> Option<FeedEvent> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = async { self.receiver.lock().await.recv().await } => {
                if self.cancel.is_cancelled() { None } else { event }
            }
        }
    }

    /// Returns the next event if one is queued.
    pub fn try_recv(&self) -> Option<FeedEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.receiver.try_lock().ok()?.try_recv().ok()
    }
}

/// Registry entry. Owned by the connection task.
#[derive(Debug)]
pub struct SubscriptionEntry {
    handle: SubscriptionHandle,
    sender: mpsc::Sender<FeedEvent>,
    /// Server subscription id on the current connection.
    pub sid: Option<u64>,
    /// Command id of the unanswered subscribe, if any.
    pub pending: Option<u64>,
    /// Sequence state of this stream.
    pub tracker: SequenceTracker,
}

/// Outcome of offering an event to a consumer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued.
    Delivered,
    /// Queue full; event dropped.
    Dropped,
    /// Consumer went away.
    Closed,
}

impl SubscriptionEntry {
    /// Returns the entry's handle.
    #[must_use]
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Offers an event without waiting.
    pub fn deliver(&self, event: FeedEvent) -> Delivery {
        match self.sender.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn release(&self) {
        self.handle.cancel.cancel();
    }

    /// Ends the subscription after queued events are read.
    ///
    /// Dropping the sender closes the queue behind anything already in it.
    pub fn close(self) {
        self.handle.refused.store(true, Ordering::Release);
    }
}

/// All subscriptions of one feed.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    entries: HashMap<SubscriptionKey, SubscriptionEntry>,
    pending: HashMap<u64, SubscriptionKey>,
    capacity: usize,
    next_generation: u64,
    cancel: CancellationToken,
}

impl SubscriptionRegistry {
    /// Creates a registry whose handles are released when `cancel` fires.
    #[must_use]
    pub fn new(capacity: usize, cancel: CancellationToken) -> Self {
        Self {
            entries: HashMap::new(),
            pending: HashMap::new(),
            capacity: capacity.max(1),
            next_generation: 0,
            cancel,
        }
    }

    /// Returns the number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the handle for `key`, creating the subscription if needed.
    ///
    /// The flag is true when a new subscription was created.
    pub fn get_or_insert(&mut self, key: SubscriptionKey) -> (SubscriptionHandle, bool) {
        if let Some(entry) = self.entries.get(&key) {
            return (entry.handle.clone(), false);
        }

        self.next_generation += 1;
        let (sender, receiver) = mpsc::channel(self.capacity);
        let handle = SubscriptionHandle {
            key: key.clone(),
            generation: self.next_generation,
            receiver: Arc::new(Mutex::new(receiver)),
            cancel: self.cancel.child_token(),
            refused: Arc::new(AtomicBool::new(false)),
        };
        self.entries.insert(
            key,
            SubscriptionEntry {
                handle: handle.clone(),
                sender,
                sid: None,
                pending: None,
                tracker: SequenceTracker::new(),
            },
        );
        (handle, true)
    }

    /// Removes a subscription and releases its handle.
    ///
    /// Only the registration named by `generation` is removed; a stale
    /// handle for a key that has since been re-subscribed is ignored.
    /// Returns the server id to cancel, if one was assigned.
    pub fn remove(&mut self, key: &SubscriptionKey, generation: u64) -> Option<Option<u64>> {
        if self.entries.get(key)?.handle.generation != generation {
            return None;
        }
        let entry = self.entries.remove(key)?;
        if let Some(id) = entry.pending {
            self.pending.remove(&id);
        }
        entry.release();
        Some(entry.sid)
    }

    /// Returns the entry for `key`.
    #[must_use]
    pub fn get(&self, key: &SubscriptionKey) -> Option<&SubscriptionEntry> {
        self.entries.get(key)
    }

    /// Returns the entry for `key` mutably.
    pub fn get_mut(&mut self, key: &SubscriptionKey) -> Option<&mut SubscriptionEntry> {
        self.entries.get_mut(key)
    }

    /// Returns the entry a data frame belongs to.
    ///
    /// Frames whose sid is not the entry's current sid are lingering traffic
    /// from a replaced subscription and are not routed.
    pub fn route(&mut self, channel: Channel, ticker: &str, sid: u64) -> Option<&mut SubscriptionEntry> {
        let key = SubscriptionKey::new(channel, ticker);
        self.entries
            .get_mut(&key)
            .filter(|entry| entry.sid == Some(sid))
    }

    /// Records that subscribe command `id` was sent for `key`.
    pub fn mark_pending(&mut self, key: &SubscriptionKey, id: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            if let Some(previous) = entry.pending.replace(id) {
                self.pending.remove(&previous);
            }
            entry.sid = None;
            self.pending.insert(id, key.clone());
        }
    }

    /// Binds the sid from a `subscribed` reply.
    ///
    /// Returns `None` if the command no longer has a subscription, e.g. it
    /// was removed before the reply arrived.
    pub fn confirm(&mut self, id: u64, sid: u64) -> Option<SubscriptionKey> {
        let key = self.pending.remove(&id)?;
        let entry = self.entries.get_mut(&key)?;
        entry.pending = None;
        entry.sid = Some(sid);
        Some(key)
    }

    /// Takes the subscription whose pending command got an error reply.
    ///
    /// The entry leaves the registry; the caller reports the error through
    /// it and then [`close`](SubscriptionEntry::close)s it.
    pub fn fail(&mut self, id: u64) -> Option<SubscriptionEntry> {
        let key = self.pending.remove(&id)?;
        self.entries.remove(&key)
    }

    /// Detaches `key` from its current sid ahead of a resubscribe.
    ///
    /// Returns the sid to cancel.
    pub fn detach(&mut self, key: &SubscriptionKey) -> Option<u64> {
        let entry = self.entries.get_mut(key)?;
        entry.tracker.desync();
        entry.sid.take()
    }

    /// Returns all keys in a stable order.
    #[must_use]
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Forgets all connection-scoped state after a disconnect.
    pub fn reset_connection(&mut self) {
        self.pending.clear();
        for entry in self.entries.values_mut() {
            entry.sid = None;
            entry.pending = None;
            entry.tracker.clear();
        }
    }

    /// Removes every subscription and releases all handles.
    pub fn clear(&mut self) {
        for entry in self.entries.values() {
            entry.release();
        }
        self.entries.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::messages::TickerMessage;

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::new(4, CancellationToken::new())
    }

    fn ticker_event() -> FeedEvent {
        FeedEvent::Ticker(TickerMessage {
            sid: 1,
            market_ticker: "MKT".to_string(),
            price: Some(50),
            yes_bid: None,
            yes_ask: None,
            volume: None,
            open_interest: None,
            ts: None,
        })
    }

    #[test]
    fn test_key_normalizes_ticker() {
        let key = SubscriptionKey::new(Channel::Ticker, " kxbtc-25jan ");
        assert_eq!(key.ticker, "KXBTC-25JAN");
        assert_eq!(key.to_string(), "ticker:KXBTC-25JAN");
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut registry = registry();
        let key = SubscriptionKey::new(Channel::OrderbookDelta, "MKT");
        let (first, created) = registry.get_or_insert(key.clone());
        assert!(created);
        let (second, created) = registry.get_or_insert(key);
        assert!(!created);
        assert_eq!(first.key(), second.key());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut registry = registry();
        assert!(registry
            .remove(&SubscriptionKey::new(Channel::Fill, "MKT"), 1)
            .is_none());
    }

    #[test]
    fn test_confirm_binds_sid_and_routes() {
        let mut registry = registry();
        let key = SubscriptionKey::new(Channel::Ticker, "MKT");
        registry.get_or_insert(key.clone());
        registry.mark_pending(&key, 10);

        assert!(registry.route(Channel::Ticker, "MKT", 3).is_none());
        assert_eq!(registry.confirm(10, 3), Some(key.clone()));
        assert!(registry.route(Channel::Ticker, "mkt", 3).is_some());
        assert!(registry.route(Channel::Ticker, "MKT", 4).is_none());
        assert!(registry.confirm(10, 3).is_none());
    }

    #[test]
    fn test_confirm_after_remove_is_unknown() {
        let mut registry = registry();
        let key = SubscriptionKey::new(Channel::Ticker, "MKT");
        let (handle, _) = registry.get_or_insert(key.clone());
        registry.mark_pending(&key, 1);
        registry.remove(&key, handle.generation());
        assert!(registry.confirm(1, 9).is_none());
    }

    #[test]
    fn test_detach_and_reset_clear_sids() {
        let mut registry = registry();
        let key = SubscriptionKey::new(Channel::OrderbookDelta, "MKT");
        registry.get_or_insert(key.clone());
        registry.mark_pending(&key, 1);
        registry.confirm(1, 7);
        assert_eq!(registry.detach(&key), Some(7));
        assert!(registry.route(Channel::OrderbookDelta, "MKT", 7).is_none());

        registry.mark_pending(&key, 2);
        registry.confirm(2, 8);
        registry.reset_connection();
        assert!(registry.get(&key).and_then(|e| e.sid).is_none());
        assert_eq!(registry.keys(), vec![key]);
    }

    #[tokio::test]
    async fn test_deliver_and_recv() {
        let mut registry = registry();
        let key = SubscriptionKey::new(Channel::Ticker, "MKT");
        let (handle, _) = registry.get_or_insert(key.clone());
        let entry = registry.get(&key).expect("entry");
        assert_eq!(entry.deliver(ticker_event()), Delivery::Delivered);
        assert_eq!(handle.recv().await, Some(ticker_event()));
    }

    #[test]
    fn test_full_queue_drops() {
        let mut registry = SubscriptionRegistry::new(1, CancellationToken::new());
        let key = SubscriptionKey::new(Channel::Ticker, "MKT");
        registry.get_or_insert(key.clone());
        let entry = registry.get(&key).expect("entry");
        assert_eq!(entry.deliver(ticker_event()), Delivery::Delivered);
        assert_eq!(entry.deliver(ticker_event()), Delivery::Dropped);
    }

    #[tokio::test]
    async fn test_remove_releases_handle() {
        let mut registry = registry();
        let key = SubscriptionKey::new(Channel::Ticker, "MKT");
        let (handle, _) = registry.get_or_insert(key.clone());
        registry
            .get(&key)
            .expect("entry")
            .deliver(ticker_event());
        registry.remove(&key, handle.generation());
        assert!(handle.is_closed());
        assert_eq!(handle.recv().await, None);
        assert_eq!(handle.try_recv(), None);
    }

    #[tokio::test]
    async fn test_parent_cancel_releases_all() {
        let cancel = CancellationToken::new();
        let mut registry = SubscriptionRegistry::new(4, cancel.clone());
        let (a, _) = registry.get_or_insert(SubscriptionKey::new(Channel::Ticker, "A"));
        let (b, _) = registry.get_or_insert(SubscriptionKey::new(Channel::Trade, "B"));
        cancel.cancel();
        assert_eq!(a.recv().await, None);
        assert!(b.is_closed());
    }

    #[test]
    fn test_recv_wakes_on_release() {
        let mut registry = registry();
        let key = SubscriptionKey::new(Channel::Ticker, "MKT");
        let (handle, _) = registry.get_or_insert(key.clone());

        let mut recv = tokio_test::task::spawn(handle.recv());
        tokio_test::assert_pending!(recv.poll());

        registry.remove(&key, handle.generation());
        assert!(recv.is_woken());
        assert_eq!(tokio_test::assert_ready!(recv.poll()), None);
    }

    #[test]
    fn test_stale_handle_does_not_remove_successor() {
        let mut registry = registry();
        let key = SubscriptionKey::new(Channel::OrderbookDelta, "MKT");
        let (first, _) = registry.get_or_insert(key.clone());
        assert_eq!(registry.remove(&key, first.generation()), Some(None));

        let (second, created) = registry.get_or_insert(key.clone());
        assert!(created);
        assert_ne!(first.generation(), second.generation());

        assert!(registry.remove(&key, first.generation()).is_none());
        assert!(!second.is_closed());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remove(&key, second.generation()), Some(None));
        assert!(second.is_closed());
    }

    #[tokio::test]
    async fn test_failed_subscribe_drains_then_ends() {
        let mut registry = registry();
        let key = SubscriptionKey::new(Channel::Ticker, "MKT");
        let (handle, _) = registry.get_or_insert(key.clone());
        registry.mark_pending(&key, 4);

        let entry = registry.fail(4).expect("pending entry");
        assert!(registry.is_empty());
        assert!(registry.fail(4).is_none());

        let error = FeedEvent::Error {
            code: 6,
            message: "market not found".to_string(),
        };
        assert_eq!(entry.deliver(error.clone()), Delivery::Delivered);
        entry.close();

        assert!(handle.is_closed());
        assert_eq!(handle.recv().await, Some(error));
        assert_eq!(handle.recv().await, None);
    }
}
