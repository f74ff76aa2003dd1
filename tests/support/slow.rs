//! Client wrapper whose `connect` takes a while.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use spreadwatch::domain::{OrderBook, OrderSide, Price, TradingPair, VenueId, Volume};
use spreadwatch::error::ExchangeError;
use spreadwatch::exchange::{Balance, BookStream, ExchangeClient, OrderFill, TimeInForce};

pub struct SlowConnect {
    inner: Arc<dyn ExchangeClient>,
    delay: Duration,
}

impl SlowConnect {
    pub fn new(inner: Arc<dyn ExchangeClient>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl ExchangeClient for SlowConnect {
    fn venue(&self) -> &VenueId {
        self.inner.venue()
    }

    async fn connect(&self) -> Result<(), ExchangeError> {
        tokio::time::sleep(self.delay).await;
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated()
    }

    fn supports_streaming(&self) -> bool {
        self.inner.supports_streaming()
    }

    async fn order_book_snapshot(
        &self,
        pair: &TradingPair,
        depth: usize,
    ) -> Result<OrderBook, ExchangeError> {
        self.inner.order_book_snapshot(pair, depth).await
    }

    async fn subscribe_order_book(&self, pair: &TradingPair) -> Result<(), ExchangeError> {
        self.inner.subscribe_order_book(pair).await
    }

    async fn unsubscribe_order_book(&self, pair: &TradingPair) -> Result<(), ExchangeError> {
        self.inner.unsubscribe_order_book(pair).await
    }

    fn stream_order_book_updates(&self, pair: &TradingPair) -> BookStream {
        self.inner.stream_order_book_updates(pair)
    }

    async fn place_market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: Volume,
    ) -> Result<OrderFill, ExchangeError> {
        self.inner.place_market_order(pair, side, quantity).await
    }

    async fn place_limit_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        price: Price,
        quantity: Volume,
        time_in_force: TimeInForce,
    ) -> Result<OrderFill, ExchangeError> {
        self.inner
            .place_limit_order(pair, side, price, quantity, time_in_force)
            .await
    }

    async fn balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        self.inner.balances().await
    }
}
