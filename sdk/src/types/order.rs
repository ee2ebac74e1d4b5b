//! Order types for the Kalshi SDK.
//!
//! Provides the order request sent to the exchange and the order record it
//! returns.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::primitives::{Action, Price, Side};

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Limit order resting at a price.
    Limit,
    /// Market order.
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
        }
    }
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted but not yet on the book.
    Pending,
    /// Resting on the book awaiting a match.
    Resting,
    /// Cancelled.
    Canceled,
    /// Completely filled.
    Executed,
}

impl OrderStatus {
    /// Returns true if the order is still working.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Resting)
    }

    /// Returns true if the order is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Executed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Resting => write!(f, "resting"),
            Self::Canceled => write!(f, "canceled"),
            Self::Executed => write!(f, "executed"),
        }
    }
}

/// Parameters for placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOrderRequest {
    /// Market ticker.
    pub ticker: String,

    /// Buy or sell.
    pub action: Action,

    /// Contract side.
    pub side: Side,

    /// Number of contracts.
    pub count: u32,

    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,

    /// Limit price on the yes side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yes_price: Option<Price>,

    /// Limit price on the no side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_price: Option<Price>,

    /// Caller-chosen idempotency key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl CreateOrderRequest {
    /// Creates a limit order priced on the given side.
    #[must_use]
    pub fn limit(
        ticker: impl Into<String>,
        action: Action,
        side: Side,
        count: u32,
        price: Price,
    ) -> Self {
        let (yes_price, no_price) = match side {
            Side::Yes => (Some(price), None),
            Side::No => (None, Some(price)),
        };
        Self {
            ticker: ticker.into().to_uppercase(),
            action,
            side,
            count,
            order_type: OrderType::Limit,
            yes_price,
            no_price,
            client_order_id: None,
        }
    }

    /// Sets the client order id.
    #[must_use]
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

/// An order as returned by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned order id.
    pub order_id: String,

    /// Market ticker.
    pub ticker: String,

    /// Current status.
    pub status: OrderStatus,

    /// Contract side.
    #[serde(default)]
    pub side: Option<Side>,

    /// Buy or sell.
    #[serde(default)]
    pub action: Option<Action>,

    /// Yes price in cents.
    #[serde(default)]
    pub yes_price: Option<i64>,

    /// No price in cents.
    #[serde(default)]
    pub no_price: Option<i64>,

    /// Contracts still resting.
    #[serde(default)]
    pub remaining_count: Option<i64>,

    /// Client order id, if one was supplied.
    #[serde(default)]
    pub client_order_id: Option<String>,

    /// Creation time (RFC 3339).
    #[serde(default)]
    pub created_time: Option<String>,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Order {} on {} ({})", self.order_id, self.ticker, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_request_prices_selected_side() {
        let price = Price::new(40).expect("valid price");
        let req = CreateOrderRequest::limit("kxbtc-26jan", Action::Buy, Side::No, 5, price)
            .with_client_order_id("abc");

        assert_eq!(req.ticker, "KXBTC-26JAN");
        assert_eq!(req.no_price, Some(price));
        assert!(req.yes_price.is_none());

        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(json["type"], "limit");
        assert_eq!(json["side"], "no");
        assert_eq!(json["action"], "buy");
        assert_eq!(json["no_price"], 40);
        assert_eq!(json["client_order_id"], "abc");
        assert!(json.get("yes_price").is_none());
    }

    #[test]
    fn test_order_deserialize_minimal() {
        let json = r#"{"order_id":"abc-123","ticker":"KXTEST","status":"resting"}"#;
        let order: Order = serde_json::from_str(json).expect("deserialize");
        assert_eq!(order.order_id, "abc-123");
        assert!(order.status.is_active());
        assert!(order.side.is_none());
    }

    #[test]
    fn test_order_status_terminal() {
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Executed.is_terminal());
        assert!(!OrderStatus::Resting.is_terminal());
    }
}
