//! Core types for the Kalshi SDK.
//!
//! Prices, sides and the thin records the REST layer hands back.

pub mod book;
pub mod order;
pub mod portfolio;
pub mod primitives;

pub use book::{BookView, Ladder, RestOrderbook};
pub use order::{CreateOrderRequest, Order, OrderStatus, OrderType};
pub use portfolio::{ApiKey, Balance, ExchangeStatus, Fill, Position};
pub use primitives::{Action, Price, Side};
