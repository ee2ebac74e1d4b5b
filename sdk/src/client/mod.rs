//! Signed HTTP client for the Kalshi REST API.
//!
//! This module provides request signing, the REST error taxonomy, and a
//! transport that retries retryable failures with jittered backoff.
//!
//! # Example
//!
//! ```rust,ignore
//! use kalshi_sdk::client::{Credentials, Environment, KalshiClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials::from_env()?;
//!     let client = KalshiClient::for_environment(Environment::Demo, credentials)?;
//!
//!     let balance = client.get_balance().await?;
//!     println!("Balance: {}", balance);
//!
//!     let book = client.get_orderbook("KXBTC-25JAN", Some(10)).await?;
//!     println!("Best yes bid: {:?}", book.best_yes_bid());
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod retry;

pub use auth::{AuthHeaders, Credentials};
pub use config::{ClientConfig, Environment};
pub use error::{ClientError, ErrorEnvelope};
pub use http::{ApiRequest, KalshiClient, Page};
pub use retry::RetryPolicy;
