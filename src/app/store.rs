//! Thread-safe order book store with update notifications.
//!
//! Holds the latest book per (venue, pair). Writers for distinct keys never
//! contend; a write replaces the whole entry.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::domain::{BestQuotes, OrderBook, PriceQuote, TradingPair, VenueId};

const DEFAULT_NOTIFY_CAPACITY: usize = 1024;

/// Notification sent when a book is replaced or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookUpdate {
    pub venue: VenueId,
    pub pair: TradingPair,
}

/// Latest order book per (venue, pair).
pub struct OrderBookStore {
    books: DashMap<(VenueId, TradingPair), OrderBook>,
    tx: broadcast::Sender<BookUpdate>,
}

impl OrderBookStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_NOTIFY_CAPACITY)
    }

    /// Create a store whose update channel buffers `capacity` notifications.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            books: DashMap::new(),
            tx,
        }
    }

    /// Subscribe to update notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BookUpdate> {
        self.tx.subscribe()
    }

    /// Replace the cached book for (venue, pair).
    pub fn put(&self, venue: VenueId, pair: TradingPair, book: OrderBook) {
        self.books.insert((venue.clone(), pair.clone()), book);
        // No receivers is fine.
        let _ = self.tx.send(BookUpdate { venue, pair });
    }

    #[must_use]
    pub fn get(&self, venue: &VenueId, pair: &TradingPair) -> Option<OrderBook> {
        self.books
            .get(&(venue.clone(), pair.clone()))
            .map(|entry| entry.value().clone())
    }

    /// Drop the cached book; returns whether one was present.
    pub fn remove(&self, venue: &VenueId, pair: &TradingPair) -> bool {
        let removed = self.books.remove(&(venue.clone(), pair.clone())).is_some();
        if removed {
            let _ = self.tx.send(BookUpdate {
                venue: venue.clone(),
                pair: pair.clone(),
            });
        }
        removed
    }

    /// Venues with a cached book for `pair`, sorted.
    #[must_use]
    pub fn venues_for(&self, pair: &TradingPair) -> Vec<VenueId> {
        let mut venues: Vec<_> = self
            .books
            .iter()
            .filter(|entry| &entry.key().1 == pair)
            .map(|entry| entry.key().0.clone())
            .collect();
        venues.sort();
        venues
    }

    /// Highest bid and lowest ask for `pair` across all cached venues.
    ///
    /// Quotes carry the venue the book is cached under. Ties go to the lexicographically smaller venue id.
    #[must_use]
    pub fn best_across_venues(&self, pair: &TradingPair) -> BestQuotes {
        let mut best = BestQuotes::empty(pair.clone());

        for entry in self.books.iter().filter(|entry| &entry.key().1 == pair) {
            let venue = &entry.key().0;
            let book = entry.value();
            if let Some(level) = book.best_bid() {
                let better = best.bid.as_ref().map_or(true, |current| {
                    level.price() > current.price
                        || (level.price() == current.price && venue < &current.venue)
                });
                if better {
                    best.bid = Some(PriceQuote {
                        venue: venue.clone(),
                        price: level.price(),
                        quantity: level.quantity(),
                        timestamp: book.timestamp(),
                    });
                }
            }
            if let Some(level) = book.best_ask() {
                let better = best.ask.as_ref().map_or(true, |current| {
                    level.price() < current.price
                        || (level.price() == current.price && venue < &current.venue)
                });
                if better {
                    best.ask = Some(PriceQuote {
                        venue: venue.clone(),
                        price: level.price(),
                        quantity: level.quantity(),
                        timestamp: book.timestamp(),
                    });
                }
            }
        }

        best
    }

    /// Number of cached books.
    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

impl Default for OrderBookStore {
    fn default() -> Self {
        Self::new()
    }
}
