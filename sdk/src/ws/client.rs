//! WebSocket client implementation.
//!
//! Provides [`KalshiFeed`], the public handle to the streaming feed.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::WsConfig;
use super::connection::{ConnectionState, FeedCommand, StreamConnection};
use super::dispatcher::{BookStore, Dispatcher};
use super::error::WsError;
use super::messages::Channel;
use super::metrics::{FeedMetrics, FeedMetricsSnapshot};
use super::subscription::{SubscriptionHandle, SubscriptionKey, SubscriptionRegistry};
use crate::client::auth::Credentials;
use crate::types::BookView;

/// Depth of the request queue into the connection task.
const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Handle to the streaming feed.
///
/// Clones share one connection. The connection task runs until
/// [`shutdown`](Self::shutdown) or until reconnect attempts are exhausted.
#[derive(Debug, Clone)]
pub struct KalshiFeed {
    config: WsConfig,
    commands: mpsc::Sender<FeedCommand>,
    books: BookStore,
    state: watch::Receiver<ConnectionState>,
    metrics: Arc<FeedMetrics>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl KalshiFeed {
    /// Starts the feed. Must be called from within a Tokio runtime.
    ///
    /// Without credentials only public channels can be used.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn start(config: WsConfig, credentials: Option<Credentials>) -> Result<Self, WsError> {
        Self::start_with_cancellation(config, credentials, CancellationToken::new())
    }

    /// Starts the feed, stopping when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn start_with_cancellation(
        config: WsConfig,
        credentials: Option<Credentials>,
        cancel: CancellationToken,
    ) -> Result<Self, WsError> {
        config.validate()?;

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let books = BookStore::default();
        let metrics = Arc::new(FeedMetrics::new());

        let registry = SubscriptionRegistry::new(config.queue_capacity, cancel.clone());
        let dispatcher = Dispatcher::new(registry, Arc::clone(&books), Arc::clone(&metrics));
        let connection = StreamConnection::new(
            config.clone(),
            credentials,
            dispatcher,
            commands_rx,
            state_tx,
            Arc::clone(&metrics),
            cancel.clone(),
        );
        let task = tokio::spawn(connection.run());

        Ok(Self {
            config,
            commands: commands_tx,
            books,
            state: state_rx,
            metrics,
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }

    /// Returns the feed configuration.
    #[must_use]
    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Subscribes to a channel for a market.
    ///
    /// Subscribing to an active (channel, ticker) pair returns the existing
    /// handle. Subscriptions made while disconnected are issued on connect.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Closed` if the feed has shut down.
    pub async fn subscribe(&self, ticker: &str, channel: Channel) -> Result<SubscriptionHandle, WsError> {
        if self.cancel.is_cancelled() {
            return Err(WsError::Closed);
        }
        let (reply, response) = oneshot::channel();
        let key = SubscriptionKey::new(channel, ticker);
        self.commands
            .send(FeedCommand::Subscribe { key, reply })
            .await
            .map_err(|_| WsError::Closed)?;
        response.await.map_err(|_| WsError::Closed)
    }

    /// Removes a subscription and releases its handle.
    ///
    /// Unknown subscriptions and a stopped feed are both no-ops, as is a
    /// handle whose subscription was already removed, even if the same pair
    /// has been subscribed again since.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let command = FeedCommand::Unsubscribe {
            key: handle.key().clone(),
            generation: handle.generation(),
        };
        let _ = self.commands.send(command).await;
    }

    /// Returns a copy of a market's replicated book.
    ///
    /// `None` until the first snapshot for the ticker has been applied. A
    /// returned view with `synced == false` is awaiting a resnapshot.
    pub async fn current_book(&self, ticker: &str) -> Option<BookView> {
        let ticker = ticker.trim().to_uppercase();
        self.books
            .read()
            .await
            .get(&ticker)
            .map(|book| book.snapshot_view())
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes connection state changes.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Returns a snapshot of the feed metrics.
    #[must_use]
    pub fn metrics(&self) -> FeedMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns true once the feed has stopped or is stopping.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Closes the connection, clears the registry and releases every handle.
    ///
    /// Waits for the connection task to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_config() -> WsConfig {
        WsConfig::new("ws://127.0.0.1:1/trade-api/ws/v2")
            .with_connect_timeout(Duration::from_millis(200))
    }

    #[test]
    fn test_feed_invalid_config() {
        let config = WsConfig::new("https://example.com");
        assert!(KalshiFeed::start(config, None).is_err());
    }

    #[tokio::test]
    async fn test_subscribe_while_disconnected_is_idempotent() {
        let feed = KalshiFeed::start(unreachable_config(), None).expect("feed");
        let first = feed.subscribe("mkt", Channel::OrderbookDelta).await.expect("subscribe");
        let second = feed.subscribe("MKT", Channel::OrderbookDelta).await.expect("subscribe");
        assert_eq!(first.key(), second.key());
        assert_eq!(first.ticker(), "MKT");
        assert_ne!(feed.state(), ConnectionState::Synced);
        assert!(feed.current_book("MKT").await.is_none());
        feed.shutdown().await;
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_handle() {
        let feed = KalshiFeed::start(unreachable_config(), None).expect("feed");
        let handle = feed.subscribe("MKT", Channel::Ticker).await.expect("subscribe");
        feed.unsubscribe(&handle).await;
        // A second unsubscribe of the same pair is a no-op.
        feed.unsubscribe(&handle).await;
        let event = tokio::time::timeout(Duration::from_secs(2), handle.recv())
            .await
            .expect("released in time");
        assert!(event.is_none());
        feed.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_and_rejects() {
        let feed = KalshiFeed::start(unreachable_config(), None).expect("feed");
        let handle = feed.subscribe("MKT", Channel::Trade).await.expect("subscribe");
        feed.shutdown().await;

        assert!(feed.is_closed());
        assert_eq!(feed.state(), ConnectionState::Disconnected);
        assert!(handle.recv().await.is_none());
        assert!(matches!(
            feed.subscribe("MKT", Channel::Trade).await,
            Err(WsError::Closed)
        ));
    }
}
