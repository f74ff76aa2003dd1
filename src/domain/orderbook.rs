//! Order book types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ids::VenueId;
use super::money::{Price, Volume};
use super::pair::TradingPair;

/// A single price level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    price: Price,
    quantity: Volume,
}

impl PriceLevel {
    /// Create a new price level
    #[must_use]
    pub const fn new(price: Price, quantity: Volume) -> Self {
        Self { price, quantity }
    }

    /// Get the price
    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    /// Get the quantity available at this price
    #[must_use]
    pub const fn quantity(&self) -> Volume {
        self.quantity
    }

    /// Both price and quantity are strictly positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.price.is_sign_positive()
            && !self.price.is_zero()
            && self.quantity.is_sign_positive()
            && !self.quantity.is_zero()
    }
}

/// Latest order book for one pair on one venue.
///
/// Bids are sorted by descending price, asks by ascending price. Books are
/// replaced wholesale on every update and never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    venue: VenueId,
    pair: TradingPair,
    timestamp: DateTime<Utc>,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

impl OrderBook {
    /// Build a book from raw levels as delivered by a venue.
    ///
    /// Levels with a non-positive price or quantity are dropped; the rest of
    /// the book is kept. Each side is sorted best-first.
    #[must_use]
    pub fn new(
        venue: VenueId,
        pair: TradingPair,
        timestamp: DateTime<Utc>,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Self {
        let mut bids = retain_valid(&venue, &pair, "bid", bids);
        let mut asks = retain_valid(&venue, &pair, "ask", asks);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Self {
            venue,
            pair,
            timestamp,
            bids,
            asks,
        }
    }

    /// Venue this book came from
    #[must_use]
    pub const fn venue(&self) -> &VenueId {
        &self.venue
    }

    /// Trading pair
    #[must_use]
    pub const fn pair(&self) -> &TradingPair {
        &self.pair
    }

    /// Venue-side timestamp of this snapshot
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get all bid levels
    #[must_use]
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    /// Get all ask levels
    #[must_use]
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    /// Best bid (highest buy price)
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask (lowest sell price)
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Truncate both sides to at most `depth` levels.
    #[must_use]
    pub fn truncated(mut self, depth: usize) -> Self {
        self.bids.truncate(depth);
        self.asks.truncate(depth);
        self
    }
}

fn retain_valid(
    venue: &VenueId,
    pair: &TradingPair,
    side: &'static str,
    levels: Vec<PriceLevel>,
) -> Vec<PriceLevel> {
    let before = levels.len();
    let kept: Vec<PriceLevel> = levels.into_iter().filter(PriceLevel::is_valid).collect();
    if kept.len() < before {
        debug!(
            venue = %venue,
            pair = %pair,
            side,
            dropped = before - kept.len(),
            "Discarded invalid order book entries"
        );
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair() -> TradingPair {
        "BTC-USD".parse().unwrap()
    }

    #[test]
    fn sides_are_sorted_best_first() {
        let book = OrderBook::new(
            VenueId::from("alpha"),
            pair(),
            Utc::now(),
            vec![
                PriceLevel::new(dec!(99), dec!(1)),
                PriceLevel::new(dec!(101), dec!(1)),
                PriceLevel::new(dec!(100), dec!(1)),
            ],
            vec![
                PriceLevel::new(dec!(105), dec!(1)),
                PriceLevel::new(dec!(102), dec!(1)),
            ],
        );

        assert_eq!(book.best_bid().unwrap().price(), dec!(101));
        assert_eq!(book.bids()[2].price(), dec!(99));
        assert_eq!(book.best_ask().unwrap().price(), dec!(102));
    }

    #[test]
    fn invalid_entries_are_dropped_without_discarding_book() {
        let book = OrderBook::new(
            VenueId::from("alpha"),
            pair(),
            Utc::now(),
            vec![
                PriceLevel::new(dec!(0), dec!(1)),
                PriceLevel::new(dec!(100), dec!(-1)),
                PriceLevel::new(dec!(98), dec!(2)),
            ],
            vec![PriceLevel::new(dec!(-5), dec!(1))],
        );

        assert_eq!(book.bids().len(), 1);
        assert_eq!(book.best_bid().unwrap().quantity(), dec!(2));
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn truncated_limits_depth() {
        let levels = (1..=5)
            .map(|i| PriceLevel::new(rust_decimal::Decimal::from(i), dec!(1)))
            .collect::<Vec<_>>();
        let book = OrderBook::new(
            VenueId::from("alpha"),
            pair(),
            Utc::now(),
            levels.clone(),
            levels,
        )
        .truncated(2);

        assert_eq!(book.bids().len(), 2);
        assert_eq!(book.asks().len(), 2);
    }
}
