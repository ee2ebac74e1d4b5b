//! Kalshi SDK - Rust client core for the Kalshi exchange.
//!
//! This crate provides the transport and market-data core of a Kalshi
//! client: a signed REST client with classified errors and retries, and a
//! streaming feed that keeps local order books consistent with the venue.
//!
//! # Modules
//!
//! - [`client`]: Signed REST transport ([`KalshiClient`])
//! - [`ws`]: Streaming feed and order book replicas ([`KalshiFeed`])
//! - [`session`]: Both behind one handle ([`KalshiSession`])
//! - [`types`]: Prices, sides and REST records
//!
//! # Core Types
//!
//! - [`Price`]: Contract price in cents, 1 through 99
//! - [`Side`]: Book side (Yes/No)
//! - [`BookView`]: Immutable copy of a replicated book
//!
//! # Example
//!
//! ```rust
//! use kalshi_sdk::{Price, Side};
//!
//! let price = Price::new(45).unwrap();
//! assert_eq!(price.complement().cents(), 55);
//! assert_eq!(Side::Yes.opposite(), Side::No);
//! ```

pub mod client;
pub mod error;
pub mod session;
pub mod types;
pub mod ws;

pub use client::{ClientConfig, ClientError, Credentials, Environment, KalshiClient, RetryPolicy};
pub use error::SdkError;
pub use session::{KalshiSession, SessionError};
pub use types::{
    Action, Balance, BookView, CreateOrderRequest, Fill, Ladder, Order, OrderStatus, OrderType,
    Position, Price, Side,
};
pub use ws::{Channel, FeedEvent, KalshiFeed, SubscriptionHandle, WsConfig, WsError};
