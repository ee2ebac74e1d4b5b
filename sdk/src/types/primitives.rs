//! Primitive types for the Kalshi SDK.
//!
//! Provides type-safe wrappers for contract prices, book sides and order
//! actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Lowest valid contract price in cents.
pub const MIN_PRICE_CENTS: u8 = 1;

/// Highest valid contract price in cents.
pub const MAX_PRICE_CENTS: u8 = 99;

/// Sum of a yes price and its complementary no price.
pub const PRICE_COMPLEMENT_CENTS: u8 = 100;

/// A contract price in cents.
///
/// Always within the venue's `1..=99` domain. A yes price of `p` is
/// equivalent to a no price of `100 - p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Price(u8);

impl Price {
    /// Creates a new price.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::InvalidPrice` if the value is outside `1..=99`.
    pub fn new(cents: i64) -> Result<Self, SdkError> {
        if cents < i64::from(MIN_PRICE_CENTS) || cents > i64::from(MAX_PRICE_CENTS) {
            return Err(SdkError::InvalidPrice(cents));
        }
        Ok(Self(cents as u8))
    }

    /// Returns the raw value in cents.
    #[must_use]
    pub const fn cents(&self) -> u8 {
        self.0
    }

    /// Returns the price of the opposite side of the same contract.
    #[must_use]
    pub const fn complement(&self) -> Self {
        Self(PRICE_COMPLEMENT_CENTS - self.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}¢", self.0)
    }
}

impl TryFrom<i64> for Price {
    type Error = SdkError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for u8 {
    fn from(price: Price) -> Self {
        price.0
    }
}

/// Contract side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The "yes" outcome.
    Yes,
    /// The "no" outcome.
    No,
}

impl Side {
    /// Returns the opposite side.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    /// Returns true if this is the yes side.
    #[must_use]
    pub const fn is_yes(&self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "yes"),
            Self::No => write!(f, "no"),
        }
    }
}

impl FromStr for Side {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            _ => Err(SdkError::InvalidSide(s.to_string())),
        }
    }
}

/// Order action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Buy contracts.
    Buy,
    /// Sell contracts.
    Sell,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_bounds() {
        assert!(Price::new(0).is_err());
        assert!(Price::new(1).is_ok());
        assert!(Price::new(99).is_ok());
        assert!(Price::new(100).is_err());
        assert!(Price::new(-5).is_err());
    }

    #[test]
    fn test_price_complement() {
        let price = Price::new(45).expect("valid price");
        assert_eq!(price.complement().cents(), 55);
        assert_eq!(price.complement().complement(), price);
    }

    #[test]
    fn test_price_display() {
        let price = Price::new(7).expect("valid price");
        assert_eq!(price.to_string(), "7¢");
    }

    #[test]
    fn test_price_deserialize_rejects_out_of_domain() {
        assert!(serde_json::from_str::<Price>("42").is_ok());
        assert!(serde_json::from_str::<Price>("0").is_err());
        assert!(serde_json::from_str::<Price>("150").is_err());
    }

    #[test]
    fn test_side_parse_and_display() {
        assert_eq!("YES".parse::<Side>().expect("parse"), Side::Yes);
        assert_eq!("no".parse::<Side>().expect("parse"), Side::No);
        assert!("maybe".parse::<Side>().is_err());
        assert_eq!(Side::Yes.opposite(), Side::No);
        assert_eq!(Side::No.to_string(), "no");
    }

    #[test]
    fn test_action_serialize() {
        let json = serde_json::to_string(&Action::Buy).expect("serialize");
        assert_eq!(json, "\"buy\"");
    }
}
