//! Order book view types for the Kalshi SDK.
//!
//! A Kalshi book has two bid ladders, one per contract side. Because a yes
//! price `p` is the same contract as a no price `100 - p`, the best yes ask
//! is the complement of the best no bid and vice versa.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::primitives::{Price, Side, PRICE_COMPLEMENT_CENTS};

/// Price to resting size mapping for one side of a book.
pub type Ladder = BTreeMap<Price, u64>;

/// Immutable copy of a market's book at one sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookView {
    /// Market ticker.
    pub ticker: String,

    /// Yes bid ladder.
    pub yes: Ladder,

    /// No bid ladder.
    pub no: Ladder,

    /// Last sequence number applied.
    pub sequence: u64,

    /// Whether the book was synchronized with the venue when copied.
    pub synced: bool,
}

impl BookView {
    /// Creates a new empty, unsynced view.
    #[must_use]
    pub fn empty(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            yes: Ladder::new(),
            no: Ladder::new(),
            sequence: 0,
            synced: false,
        }
    }

    /// Returns the ladder for a side.
    #[must_use]
    pub fn ladder(&self, side: Side) -> &Ladder {
        match side {
            Side::Yes => &self.yes,
            Side::No => &self.no,
        }
    }

    /// Returns the best bid level for a side.
    #[must_use]
    pub fn best_bid(&self, side: Side) -> Option<(Price, u64)> {
        self.ladder(side)
            .iter()
            .next_back()
            .map(|(price, size)| (*price, *size))
    }

    /// Returns the best ask for a side, derived from the opposite ladder.
    #[must_use]
    pub fn best_ask(&self, side: Side) -> Option<(Price, u64)> {
        self.best_bid(side.opposite())
            .map(|(price, size)| (price.complement(), size))
    }

    /// Returns the best yes bid.
    #[must_use]
    pub fn best_yes_bid(&self) -> Option<Price> {
        self.best_bid(Side::Yes).map(|(price, _)| price)
    }

    /// Returns the best yes ask.
    #[must_use]
    pub fn best_yes_ask(&self) -> Option<Price> {
        self.best_ask(Side::Yes).map(|(price, _)| price)
    }

    /// Returns the yes spread in cents.
    #[must_use]
    pub fn spread(&self) -> Option<i16> {
        match (self.best_yes_bid(), self.best_yes_ask()) {
            (Some(bid), Some(ask)) => Some(i16::from(ask.cents()) - i16::from(bid.cents())),
            _ => None,
        }
    }

    /// Returns the yes midpoint in cents.
    #[must_use]
    pub fn midpoint(&self) -> Option<f64> {
        match (self.best_yes_bid(), self.best_yes_ask()) {
            (Some(bid), Some(ask)) => Some((f64::from(bid.cents()) + f64::from(ask.cents())) / 2.0),
            _ => None,
        }
    }

    /// Returns true if the best bids of both sides sum past 100 cents.
    ///
    /// A resting book on the venue is never crossed; seeing one means the
    /// local copy has diverged.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(Side::Yes), self.best_bid(Side::No)) {
            (Some((yes, _)), Some((no, _))) => {
                u16::from(yes.cents()) + u16::from(no.cents()) > u16::from(PRICE_COMPLEMENT_CENTS)
            }
            _ => false,
        }
    }

    /// Returns the size resting at a price, if any.
    #[must_use]
    pub fn size_at(&self, side: Side, price: Price) -> Option<u64> {
        self.ladder(side).get(&price).copied()
    }

    /// Returns the number of levels on a side.
    #[must_use]
    pub fn depth(&self, side: Side) -> usize {
        self.ladder(side).len()
    }

    /// Returns the total resting size on a side.
    #[must_use]
    pub fn total_size(&self, side: Side) -> u64 {
        self.ladder(side).values().fold(0u64, |acc, s| acc.saturating_add(*s))
    }

    /// Returns true if both ladders are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.yes.is_empty() && self.no.is_empty()
    }
}

impl fmt::Display for BookView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Book {} (seq: {}{})",
            self.ticker,
            self.sequence,
            if self.synced { "" } else { ", desynced" }
        )?;
        writeln!(f, "  Yes:")?;
        for (price, size) in self.yes.iter().rev().take(5) {
            writeln!(f, "    {} @ {}", size, price)?;
        }
        writeln!(f, "  No:")?;
        for (price, size) in self.no.iter().rev().take(5) {
            writeln!(f, "    {} @ {}", size, price)?;
        }
        Ok(())
    }
}

/// Order book as returned by the REST endpoint.
///
/// Carries no sequence number, so it cannot baseline a streamed replica.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestOrderbook {
    /// Yes levels as `[price, size]` pairs.
    #[serde(default, deserialize_with = "nullable_levels")]
    pub yes: Vec<[i64; 2]>,

    /// No levels as `[price, size]` pairs.
    #[serde(default, deserialize_with = "nullable_levels")]
    pub no: Vec<[i64; 2]>,
}

impl RestOrderbook {
    /// Converts into a view, skipping levels outside the price domain or
    /// with non-positive size.
    #[must_use]
    pub fn into_view(self, ticker: impl Into<String>) -> BookView {
        let mut view = BookView::empty(ticker);
        view.yes = collect_ladder(&self.yes);
        view.no = collect_ladder(&self.no);
        view
    }
}

fn collect_ladder(levels: &[[i64; 2]]) -> Ladder {
    levels
        .iter()
        .filter(|[_, size]| *size > 0)
        .filter_map(|[price, size]| Price::new(*price).ok().map(|p| (p, *size as u64)))
        .collect()
}

fn nullable_levels<'de, D>(deserializer: D) -> Result<Vec<[i64; 2]>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<[i64; 2]>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(cents: i64) -> Price {
        Price::new(cents).expect("valid price")
    }

    fn sample_view() -> BookView {
        let mut view = BookView::empty("KXTEST");
        view.yes.insert(price(40), 5);
        view.yes.insert(price(45), 10);
        view.no.insert(price(50), 7);
        view.no.insert(price(55), 20);
        view.synced = true;
        view
    }

    #[test]
    fn test_best_levels() {
        let view = sample_view();
        assert_eq!(view.best_bid(Side::Yes), Some((price(45), 10)));
        assert_eq!(view.best_bid(Side::No), Some((price(55), 20)));
        assert_eq!(view.best_yes_ask(), Some(price(45)));
        assert_eq!(view.best_ask(Side::No), Some((price(55), 10)));
    }

    #[test]
    fn test_complementary_prices() {
        let view = sample_view();
        let (yes_ask, _) = view.best_ask(Side::Yes).expect("ask");
        let (no_bid, _) = view.best_bid(Side::No).expect("bid");
        assert_eq!(u16::from(yes_ask.cents()) + u16::from(no_bid.cents()), 100);
    }

    #[test]
    fn test_spread_and_midpoint() {
        let mut view = sample_view();
        view.no.remove(&price(55));
        assert_eq!(view.best_yes_ask(), Some(price(50)));
        assert_eq!(view.spread(), Some(5));
        assert_eq!(view.midpoint(), Some(47.5));
    }

    #[test]
    fn test_locked_book_is_not_crossed() {
        let view = sample_view();
        assert!(!view.is_crossed());
    }

    #[test]
    fn test_crossed_book() {
        let mut view = sample_view();
        view.no.insert(price(60), 1);
        assert!(view.is_crossed());
    }

    #[test]
    fn test_empty_view() {
        let view = BookView::empty("KXTEST");
        assert!(view.is_empty());
        assert!(view.best_yes_bid().is_none());
        assert!(view.spread().is_none());
        assert!(!view.is_crossed());
    }

    #[test]
    fn test_totals() {
        let view = sample_view();
        assert_eq!(view.total_size(Side::Yes), 15);
        assert_eq!(view.depth(Side::No), 2);
        assert_eq!(view.size_at(Side::Yes, price(40)), Some(5));
        assert_eq!(view.size_at(Side::Yes, price(41)), None);
    }

    #[test]
    fn test_rest_orderbook_into_view() {
        let json = r#"{"yes":[[45,10],[0,3],[30,0]],"no":null}"#;
        let book: RestOrderbook = serde_json::from_str(json).expect("decode");
        let view = book.into_view("KXTEST");
        assert_eq!(view.depth(Side::Yes), 1);
        assert!(view.no.is_empty());
        assert!(!view.synced);
    }
}
