//! Exchange trait definitions.
//!
//! These traits define the interface that any venue implementation must
//! provide. Wire formats, signing and reconnection live behind them.

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use rust_decimal::Decimal;

use crate::domain::{OrderBook, OrderSide, Price, TradingPair, VenueId, Volume};
use crate::error::ExchangeError;

/// Infinite stream of full order book replacements for one pair.
///
/// Dropping the stream cancels it; calling
/// [`ExchangeClient::stream_order_book_updates`] again starts a fresh one.
pub type BookStream = BoxStream<'static, Result<OrderBook, ExchangeError>>;

/// Unique identifier for an order on an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderId(pub String);

impl OrderId {
    /// Create a new OrderId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying ID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Venue-reported state of an order after placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Fully filled.
    Filled,
    /// Filled less than requested; the rest is cancelled.
    PartiallyFilled,
    /// Accepted and resting on the book.
    Open,
    /// Accepted but nothing could be matched.
    Unfilled,
    /// Refused by the venue.
    Rejected,
}

/// How long a limit order may rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeInForce {
    /// Good till cancelled.
    #[default]
    Gtc,
    /// Immediate or cancel: fill what matches now, cancel the rest.
    Ioc,
    /// Fill or kill: fill completely now or not at all.
    Fok,
}

/// Result of placing an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFill {
    pub order_id: OrderId,
    pub filled_quantity: Volume,
    pub average_fill_price: Price,
    pub fee: Decimal,
    pub fee_currency: String,
    pub status: OrderStatus,
}

impl OrderFill {
    /// Whether any quantity executed.
    #[must_use]
    pub fn has_fill(&self) -> bool {
        self.filled_quantity > Decimal::ZERO
    }
}

/// Free and locked balance of one currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub currency: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Client for one venue.
///
/// Implementations must be cheap to share behind an `Arc`; all methods take
/// `&self`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Venue this client talks to.
    fn venue(&self) -> &VenueId;

    /// Open the venue connection. Calling it while connected is a no-op.
    async fn connect(&self) -> Result<(), ExchangeError>;

    /// Close the venue connection.
    async fn disconnect(&self) -> Result<(), ExchangeError>;

    fn is_connected(&self) -> bool;

    fn is_authenticated(&self) -> bool;

    /// Whether the venue can push order book updates.
    fn supports_streaming(&self) -> bool;

    /// Fetch a one-off snapshot with at most `depth` levels per side.
    async fn order_book_snapshot(
        &self,
        pair: &TradingPair,
        depth: usize,
    ) -> Result<OrderBook, ExchangeError>;

    /// Ask the venue to start pushing books for `pair`.
    async fn subscribe_order_book(&self, pair: &TradingPair) -> Result<(), ExchangeError>;

    /// Ask the venue to stop pushing books for `pair`.
    async fn unsubscribe_order_book(&self, pair: &TradingPair) -> Result<(), ExchangeError>;

    /// Stream of book updates for `pair`.
    fn stream_order_book_updates(&self, pair: &TradingPair) -> BookStream;

    async fn place_market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: Volume,
    ) -> Result<OrderFill, ExchangeError>;

    async fn place_limit_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        price: Price,
        quantity: Volume,
        time_in_force: TimeInForce,
    ) -> Result<OrderFill, ExchangeError>;

    async fn balances(&self) -> Result<Vec<Balance>, ExchangeError>;
}
