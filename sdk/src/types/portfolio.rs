//! Portfolio records for the Kalshi SDK.
//!
//! Balance, positions, fills and account metadata returned by the REST API.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::primitives::{Action, Side};

/// Account balance in cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Available cash balance in cents.
    pub balance: i64,

    /// Value of open positions in cents.
    #[serde(default)]
    pub portfolio_value: Option<i64>,
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "balance {}¢", self.balance)?;
        if let Some(value) = self.portfolio_value {
            write!(f, ", portfolio {}¢", value)?;
        }
        Ok(())
    }
}

/// A position in one market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Market ticker.
    pub ticker: String,

    /// Net contracts held (positive yes, negative no).
    #[serde(default)]
    pub position: i64,

    /// Exposure in cents.
    #[serde(default)]
    pub market_exposure: Option<i64>,

    /// Realized profit and loss in cents.
    #[serde(default)]
    pub realized_pnl: Option<i64>,

    /// Total contracts traded.
    #[serde(default)]
    pub total_traded: Option<i64>,

    /// Resting order count.
    #[serde(default)]
    pub resting_orders_count: Option<i64>,
}

/// An executed trade on the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// Trade id.
    pub trade_id: String,

    /// Order that was filled.
    pub order_id: String,

    /// Market ticker.
    pub ticker: String,

    /// Contract side.
    pub side: Side,

    /// Buy or sell.
    pub action: Action,

    /// Contracts filled.
    pub count: i64,

    /// Yes price in cents.
    #[serde(default)]
    pub yes_price: Option<i64>,

    /// No price in cents.
    #[serde(default)]
    pub no_price: Option<i64>,

    /// Whether the account was the taker.
    #[serde(default)]
    pub is_taker: bool,

    /// Fill time (RFC 3339).
    #[serde(default)]
    pub created_time: Option<String>,
}

/// Exchange trading status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExchangeStatus {
    /// Whether the exchange is up.
    pub exchange_active: bool,

    /// Whether trading is currently allowed.
    pub trading_active: bool,
}

/// An API key registered on the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Key identifier.
    pub api_key_id: String,

    /// Optional human name.
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_display() {
        let balance: Balance =
            serde_json::from_str(r#"{"balance":5000,"portfolio_value":10000}"#).expect("decode");
        assert_eq!(balance.to_string(), "balance 5000¢, portfolio 10000¢");
    }

    #[test]
    fn test_position_defaults() {
        let pos: Position = serde_json::from_str(r#"{"ticker":"KXTEST-A"}"#).expect("decode");
        assert_eq!(pos.position, 0);
        assert!(pos.realized_pnl.is_none());
    }

    #[test]
    fn test_fill_deserialize() {
        let json = r#"{"trade_id":"t1","order_id":"o1","ticker":"KXTEST","side":"yes",
            "action":"buy","count":3,"yes_price":42,"is_taker":true}"#;
        let fill: Fill = serde_json::from_str(json).expect("decode");
        assert_eq!(fill.side, Side::Yes);
        assert_eq!(fill.count, 3);
        assert!(fill.is_taker);
    }
}
