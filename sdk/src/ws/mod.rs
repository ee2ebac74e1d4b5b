//! WebSocket client for real-time streaming.
//!
//! This module connects to the Kalshi streaming API, multiplexes
//! subscriptions over one connection and keeps a local replica of each
//! subscribed order book in sync with the venue. Sequence gaps trigger a
//! resnapshot and dropped connections a reconnect; neither surfaces as an
//! error to subscribers.
//!
//! # Example
//!
//! ```rust,ignore
//! use kalshi_sdk::client::{Credentials, Environment};
//! use kalshi_sdk::ws::{Channel, FeedEvent, KalshiFeed, WsConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials::from_env()?;
//!     let feed = KalshiFeed::start(WsConfig::for_environment(Environment::Demo), Some(credentials))?;
//!
//!     let book = feed.subscribe("KXBTC-25JAN", Channel::OrderbookDelta).await?;
//!
//!     while let Some(event) = book.recv().await {
//!         if let FeedEvent::Delta { book, .. } = event {
//!             println!("best yes bid: {:?}", book.best_yes_bid());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod messages;
pub mod metrics;
pub mod orderbook;
pub mod sequence;
pub mod subscription;

pub use client::KalshiFeed;
pub use config::WsConfig;
pub use connection::ConnectionState;
pub use dispatcher::{BookStore, Dispatcher, FollowUp};
pub use error::WsError;
pub use messages::{
    Channel, ClientCommand, DeltaMessage, FeedEvent, FillMessage, ServerMessage, SnapshotMessage,
    TickerMessage, TradeMessage,
};
pub use metrics::{FeedMetrics, FeedMetricsSnapshot};
pub use orderbook::OrderbookReplica;
pub use sequence::{SequenceCheck, SequenceTracker, SyncState};
pub use subscription::{SubscriptionHandle, SubscriptionKey, SubscriptionRegistry};
