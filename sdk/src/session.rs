//! Combined REST and streaming session.
//!
//! [`KalshiSession`] is the surface higher layers program against: book
//! subscriptions come from the feed, orders go through the REST transport,
//! and one shutdown stops both.

use tokio_util::sync::CancellationToken;

use crate::client::{ClientConfig, ClientError, Credentials, Environment, KalshiClient};
use crate::types::{BookView, CreateOrderRequest, Order};
use crate::ws::{Channel, KalshiFeed, SubscriptionHandle, WsConfig, WsError};

/// Errors from session calls.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// REST transport failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Streaming feed failure.
    #[error(transparent)]
    Feed(#[from] WsError),
}

/// A REST client and a streaming feed sharing one shutdown signal.
#[derive(Debug, Clone)]
pub struct KalshiSession {
    client: KalshiClient,
    feed: KalshiFeed,
    cancel: CancellationToken,
}

impl KalshiSession {
    /// Opens a session against an environment with default settings.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if either client cannot be built.
    pub fn new(environment: Environment, credentials: Credentials) -> Result<Self, SessionError> {
        Self::from_configs(
            ClientConfig::for_environment(environment),
            WsConfig::for_environment(environment),
            credentials,
        )
    }

    /// Opens a session from explicit configurations.
    ///
    /// # Errors
    ///
    /// Returns an error if either configuration is invalid.
    pub fn from_configs(
        rest: ClientConfig,
        stream: WsConfig,
        credentials: Credentials,
    ) -> Result<Self, SessionError> {
        let cancel = CancellationToken::new();
        let client = KalshiClient::with_cancellation(rest, Some(credentials.clone()), cancel.clone())?;
        // The feed cancels its own token when it stops; a child keeps that
        // from reaching the REST side.
        let feed = KalshiFeed::start_with_cancellation(stream, Some(credentials), cancel.child_token())?;
        Ok(Self {
            client,
            feed,
            cancel,
        })
    }

    /// Returns the REST transport.
    #[must_use]
    pub fn client(&self) -> &KalshiClient {
        &self.client
    }

    /// Returns the streaming feed.
    #[must_use]
    pub fn feed(&self) -> &KalshiFeed {
        &self.feed
    }

    /// Subscribes to a channel for a market.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed has shut down.
    pub async fn subscribe(&self, ticker: &str, channel: Channel) -> Result<SubscriptionHandle, SessionError> {
        Ok(self.feed.subscribe(ticker, channel).await?)
    }

    /// Removes a subscription.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.feed.unsubscribe(handle).await;
    }

    /// Returns the replicated book for a market, if one is being tracked.
    pub async fn current_book(&self, ticker: &str) -> Option<BookView> {
        self.feed.current_book(ticker).await
    }

    /// Fetches a book over REST.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request fails.
    pub async fn rest_book(&self, ticker: &str, depth: Option<u32>) -> Result<BookView, SessionError> {
        Ok(self.client.get_orderbook(ticker, depth).await?)
    }

    /// Places an order.
    ///
    /// # Errors
    ///
    /// Returns the transport error unmodified, e.g.
    /// `ClientError::InsufficientFunds` without any retry.
    pub async fn place_order(&self, order: &CreateOrderRequest) -> Result<Order, SessionError> {
        Ok(self.client.place_order(order).await?)
    }

    /// Cancels an order.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request fails.
    pub async fn cancel_order(&self, order_id: &str) -> Result<Order, SessionError> {
        Ok(self.client.cancel_order(order_id).await?)
    }

    /// Returns true once the session has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops the feed, releases every subscription and aborts pending REST
    /// retries at their next backoff checkpoint.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.feed.shutdown().await;
    }
}
