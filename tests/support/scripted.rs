//! Exchange client whose order book stream replays a fixed script.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;

use spreadwatch::domain::{OrderBook, OrderSide, Price, TradingPair, VenueId, Volume};
use spreadwatch::error::ExchangeError;
use spreadwatch::exchange::{Balance, BookStream, ExchangeClient, OrderFill, TimeInForce};

pub struct ScriptedExchange {
    venue: VenueId,
    connected: AtomicBool,
    fail_connect: bool,
    script: Mutex<Vec<Result<OrderBook, ExchangeError>>>,
    unsubscribes: AtomicU32,
}

impl ScriptedExchange {
    /// The first stream replays `script` and then ends; later streams are empty.
    pub fn new(venue: &str, script: Vec<Result<OrderBook, ExchangeError>>) -> Self {
        Self {
            venue: VenueId::from(venue),
            connected: AtomicBool::new(false),
            fail_connect: false,
            script: Mutex::new(script),
            unsubscribes: AtomicU32::new(0),
        }
    }

    /// A venue whose `connect` always fails.
    pub fn unreachable(venue: &str) -> Self {
        Self {
            fail_connect: true,
            ..Self::new(venue, Vec::new())
        }
    }

    pub fn unsubscribes(&self) -> u32 {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    fn rejected(&self) -> ExchangeError {
        ExchangeError::OrderRejected {
            venue: self.venue.clone(),
            reason: "scripted venue does not trade".into(),
        }
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    async fn connect(&self) -> Result<(), ExchangeError> {
        if self.fail_connect {
            return Err(ExchangeError::Connection {
                venue: self.venue.clone(),
                reason: "connection refused".into(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_authenticated(&self) -> bool {
        false
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn order_book_snapshot(
        &self,
        pair: &TradingPair,
        _depth: usize,
    ) -> Result<OrderBook, ExchangeError> {
        Err(ExchangeError::NoBook {
            venue: self.venue.clone(),
            pair: pair.clone(),
        })
    }

    async fn subscribe_order_book(&self, _pair: &TradingPair) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn unsubscribe_order_book(&self, _pair: &TradingPair) -> Result<(), ExchangeError> {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stream_order_book_updates(&self, _pair: &TradingPair) -> BookStream {
        let script = std::mem::take(&mut *self.script.lock());
        stream::iter(script).boxed()
    }

    async fn place_market_order(
        &self,
        _pair: &TradingPair,
        _side: OrderSide,
        _quantity: Volume,
    ) -> Result<OrderFill, ExchangeError> {
        Err(self.rejected())
    }

    async fn place_limit_order(
        &self,
        _pair: &TradingPair,
        _side: OrderSide,
        _price: Price,
        _quantity: Volume,
        _time_in_force: TimeInForce,
    ) -> Result<OrderFill, ExchangeError> {
        Err(self.rejected())
    }

    async fn balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        Ok(Vec::new())
    }
}
