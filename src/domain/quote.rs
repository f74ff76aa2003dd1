//! Derived best-price views. Never persisted.

use chrono::{DateTime, Duration, Utc};

use super::ids::VenueId;
use super::money::{Price, Volume};
use super::pair::TradingPair;

/// Top-of-book price on one side of one venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub venue: VenueId,
    pub price: Price,
    pub quantity: Volume,
    pub timestamp: DateTime<Utc>,
}

impl PriceQuote {
    /// Whether this quote is older than `max_age` at `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.timestamp > max_age
    }
}

/// Best bid and best ask for a pair across every cached venue.
///
/// Each side is `None` when no venue has a level on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestQuotes {
    pub pair: TradingPair,
    pub bid: Option<PriceQuote>,
    pub ask: Option<PriceQuote>,
}

impl BestQuotes {
    /// An empty view for `pair`.
    #[must_use]
    pub const fn empty(pair: TradingPair) -> Self {
        Self {
            pair,
            bid: None,
            ask: None,
        }
    }
}

/// Both sides of one venue's top of book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueQuote {
    pub venue: VenueId,
    pub pair: TradingPair,
    pub bid: Option<PriceQuote>,
    pub ask: Option<PriceQuote>,
}
