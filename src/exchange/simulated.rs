//! In-process simulated venue.
//!
//! Books come either from [`SimulatedExchange::push_book`] or from an optional
//! random-walk generator started on `connect`. Market orders walk the opposite
//! side of the current book, so thin books produce partial fills. Balances are
//! checked and settled on every fill.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::traits::{
    Balance, BookStream, ExchangeClient, OrderFill, OrderId, OrderStatus, TimeInForce,
};
use crate::config::VenueConfig;
use crate::domain::{OrderBook, OrderSide, Price, PriceLevel, TradingPair, VenueId, Volume};
use crate::error::ExchangeError;

const FEED_CAPACITY: usize = 64;
const GENERATED_DEPTH: i64 = 5;

/// Behaviour knobs for a simulated venue.
#[derive(Debug, Clone)]
pub struct SimulatedSettings {
    pub streaming: bool,
    /// Delay before an order is answered.
    pub latency: Duration,
    /// Taker fee fraction charged in quote currency.
    pub fee_rate: Decimal,
    /// Generator interval; `None` means books only arrive via `push_book`.
    pub tick_interval: Option<Duration>,
    pub mid_prices: BTreeMap<TradingPair, Decimal>,
}

impl Default for SimulatedSettings {
    fn default() -> Self {
        Self {
            streaming: true,
            latency: Duration::ZERO,
            fee_rate: dec!(0.001),
            tick_interval: None,
            mid_prices: BTreeMap::new(),
        }
    }
}

impl From<&VenueConfig> for SimulatedSettings {
    fn from(config: &VenueConfig) -> Self {
        Self {
            streaming: config.streaming,
            latency: Duration::from_millis(config.latency_ms),
            fee_rate: config.fee_rate,
            tick_interval: config.tick_interval_ms.map(Duration::from_millis),
            mid_prices: config.mid_prices.clone(),
        }
    }
}

struct Inner {
    venue: VenueId,
    settings: SimulatedSettings,
    connected: AtomicBool,
    books: RwLock<HashMap<TradingPair, OrderBook>>,
    feeds: Mutex<HashMap<TradingPair, broadcast::Sender<OrderBook>>>,
    subscriptions: Mutex<HashSet<TradingPair>>,
    balances: Mutex<HashMap<String, Decimal>>,
    order_failure: Mutex<Option<String>>,
    order_seq: AtomicU64,
    unsubscribe_calls: AtomicU32,
}

impl Inner {
    fn feed(&self, pair: &TradingPair) -> broadcast::Sender<OrderBook> {
        self.feeds
            .lock()
            .entry(pair.clone())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .clone()
    }

    fn publish(&self, book: OrderBook) {
        let pair = book.pair().clone();
        self.books.write().insert(pair.clone(), book.clone());
        // No receivers is fine.
        let _ = self.feed(&pair).send(book);
    }
}

/// Simulated exchange client.
pub struct SimulatedExchange {
    inner: Arc<Inner>,
    generators: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulatedExchange {
    /// Create a disconnected venue with no balances.
    #[must_use]
    pub fn new(venue: VenueId, settings: SimulatedSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                venue,
                settings,
                connected: AtomicBool::new(false),
                books: RwLock::new(HashMap::new()),
                feeds: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(HashSet::new()),
                balances: Mutex::new(HashMap::new()),
                order_failure: Mutex::new(None),
                order_seq: AtomicU64::new(0),
                unsubscribe_calls: AtomicU32::new(0),
            }),
            generators: Mutex::new(Vec::new()),
        }
    }

    /// Create a venue from its config entry, seeding balances.
    #[must_use]
    pub fn from_config(config: &VenueConfig) -> Self {
        let exchange = Self::new(config.id.clone(), SimulatedSettings::from(config));
        for (currency, amount) in &config.balances {
            exchange.set_balance(currency, *amount);
        }
        exchange
    }

    /// Builder-style balance seeding.
    #[must_use]
    pub fn with_balance(self, currency: &str, amount: Decimal) -> Self {
        self.set_balance(currency, amount);
        self
    }

    pub fn set_balance(&self, currency: &str, amount: Decimal) {
        self.inner
            .balances
            .lock()
            .insert(currency.to_ascii_uppercase(), amount);
    }

    #[must_use]
    pub fn balance(&self, currency: &str) -> Decimal {
        self.inner
            .balances
            .lock()
            .get(&currency.to_ascii_uppercase())
            .copied()
            .unwrap_or_default()
    }

    /// Replace the venue's book for `book.pair()` and push it to streams.
    pub fn push_book(&self, book: OrderBook) {
        self.inner.publish(book);
    }

    /// Make every order fail with `reason` until called with `None`.
    pub fn fail_orders(&self, reason: Option<String>) {
        *self.inner.order_failure.lock() = reason;
    }

    /// Pairs with an active venue-side subscription.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<TradingPair> {
        self.inner.subscriptions.lock().iter().cloned().collect()
    }

    /// Number of `unsubscribe_order_book` calls received.
    #[must_use]
    pub fn unsubscribe_calls(&self) -> u32 {
        self.inner.unsubscribe_calls.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), ExchangeError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ExchangeError::NotConnected {
                venue: self.inner.venue.clone(),
            })
        }
    }

    fn reject(&self, reason: impl Into<String>) -> ExchangeError {
        ExchangeError::OrderRejected {
            venue: self.inner.venue.clone(),
            reason: reason.into(),
        }
    }

    async fn execute(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: Volume,
        limit: Option<(Price, TimeInForce)>,
    ) -> Result<OrderFill, ExchangeError> {
        if !self.inner.settings.latency.is_zero() {
            tokio::time::sleep(self.inner.settings.latency).await;
        }
        self.ensure_connected()?;
        if let Some(reason) = self.inner.order_failure.lock().clone() {
            return Err(self.reject(reason));
        }
        if quantity <= Decimal::ZERO {
            return Err(self.reject("quantity must be positive"));
        }

        let book = self
            .inner
            .books
            .read()
            .get(pair)
            .cloned()
            .ok_or_else(|| ExchangeError::NoBook {
                venue: self.inner.venue.clone(),
                pair: pair.clone(),
            })?;
        let levels = match side {
            OrderSide::Buy => book.asks(),
            OrderSide::Sell => book.bids(),
        };
        let (mut filled, mut notional) = walk(levels, side, quantity, limit.map(|(p, _)| p));

        let mut status = if filled == quantity {
            OrderStatus::Filled
        } else if filled > Decimal::ZERO {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Unfilled
        };
        match limit.map(|(_, tif)| tif) {
            Some(TimeInForce::Fok) if filled < quantity => {
                filled = Decimal::ZERO;
                notional = Decimal::ZERO;
                status = OrderStatus::Unfilled;
            }
            Some(TimeInForce::Gtc) if filled < quantity => status = OrderStatus::Open,
            _ => {}
        }

        let fee = (notional * self.inner.settings.fee_rate).round_dp(8);
        if filled > Decimal::ZERO {
            self.settle(pair, side, filled, notional, fee)?;
        }

        let order_id = OrderId::new(format!(
            "{}-{}",
            self.inner.venue,
            self.inner.order_seq.fetch_add(1, Ordering::SeqCst) + 1
        ));
        let average_fill_price = if filled > Decimal::ZERO {
            notional / filled
        } else {
            Decimal::ZERO
        };
        debug!(
            venue = %self.inner.venue,
            pair = %pair,
            side = %side,
            requested = %quantity,
            filled = %filled,
            price = %average_fill_price,
            "Simulated order"
        );

        Ok(OrderFill {
            order_id,
            filled_quantity: filled,
            average_fill_price,
            fee,
            fee_currency: pair.quote().to_string(),
            status,
        })
    }

    fn settle(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        filled: Volume,
        notional: Decimal,
        fee: Decimal,
    ) -> Result<(), ExchangeError> {
        let mut balances = self.inner.balances.lock();
        let base = balances.get(pair.base()).copied().unwrap_or_default();
        let quote = balances.get(pair.quote()).copied().unwrap_or_default();

        match side {
            OrderSide::Buy => {
                let required = notional + fee;
                if quote < required {
                    return Err(self.reject(format!(
                        "insufficient {}: requires {required}, available {quote}",
                        pair.quote()
                    )));
                }
                balances.insert(pair.quote().to_string(), quote - required);
                balances.insert(pair.base().to_string(), base + filled);
            }
            OrderSide::Sell => {
                if base < filled {
                    return Err(self.reject(format!(
                        "insufficient {}: requires {filled}, available {base}",
                        pair.base()
                    )));
                }
                balances.insert(pair.base().to_string(), base - filled);
                balances.insert(pair.quote().to_string(), quote + notional - fee);
            }
        }
        Ok(())
    }
}

/// Consume `levels` best-first up to `quantity`, stopping at `limit`.
///
/// Returns the filled quantity and its notional value.
fn walk(
    levels: &[PriceLevel],
    side: OrderSide,
    quantity: Volume,
    limit: Option<Price>,
) -> (Volume, Decimal) {
    let mut remaining = quantity;
    let mut notional = Decimal::ZERO;

    for level in levels {
        if remaining.is_zero() {
            break;
        }
        let marketable = match (limit, side) {
            (None, _) => true,
            (Some(limit), OrderSide::Buy) => level.price() <= limit,
            (Some(limit), OrderSide::Sell) => level.price() >= limit,
        };
        if !marketable {
            break;
        }
        let take = remaining.min(level.quantity());
        notional += take * level.price();
        remaining -= take;
    }
    (quantity - remaining, notional)
}

fn spawn_generator(
    inner: Arc<Inner>,
    pair: TradingPair,
    start_mid: Decimal,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut mid = start_mid;
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            let drift = Decimal::try_from(rng.gen_range(-0.0005_f64..0.0005)).unwrap_or_default();
            mid = (mid * (Decimal::ONE + drift)).round_dp(2);
            let step = (mid * dec!(0.0002)).round_dp(2).max(dec!(0.01));

            let mut bids = Vec::new();
            let mut asks = Vec::new();
            for i in 0..GENERATED_DEPTH {
                let offset = step * Decimal::from(i + 1);
                let bid_qty = Decimal::try_from(rng.gen_range(0.05_f64..2.0))
                    .unwrap_or(Decimal::ONE)
                    .round_dp(4);
                let ask_qty = Decimal::try_from(rng.gen_range(0.05_f64..2.0))
                    .unwrap_or(Decimal::ONE)
                    .round_dp(4);
                bids.push(PriceLevel::new(mid - offset, bid_qty));
                asks.push(PriceLevel::new(mid + offset, ask_qty));
            }

            inner.publish(OrderBook::new(
                inner.venue.clone(),
                pair.clone(),
                Utc::now(),
                bids,
                asks,
            ));
        }
    })
}

#[async_trait]
impl ExchangeClient for SimulatedExchange {
    fn venue(&self) -> &VenueId {
        &self.inner.venue
    }

    async fn connect(&self) -> Result<(), ExchangeError> {
        if self.inner.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(interval) = self.inner.settings.tick_interval {
            let mut generators = self.generators.lock();
            for (pair, mid) in &self.inner.settings.mid_prices {
                generators.push(spawn_generator(
                    self.inner.clone(),
                    pair.clone(),
                    *mid,
                    interval,
                ));
            }
        }
        info!(venue = %self.inner.venue, "Simulated venue connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        self.inner.connected.store(false, Ordering::SeqCst);
        for handle in self.generators.lock().drain(..) {
            handle.abort();
        }
        info!(venue = %self.inner.venue, "Simulated venue disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn is_authenticated(&self) -> bool {
        self.is_connected()
    }

    fn supports_streaming(&self) -> bool {
        self.inner.settings.streaming
    }

    async fn order_book_snapshot(
        &self,
        pair: &TradingPair,
        depth: usize,
    ) -> Result<OrderBook, ExchangeError> {
        self.ensure_connected()?;
        self.inner
            .books
            .read()
            .get(pair)
            .cloned()
            .map(|book| book.truncated(depth))
            .ok_or_else(|| ExchangeError::NoBook {
                venue: self.inner.venue.clone(),
                pair: pair.clone(),
            })
    }

    async fn subscribe_order_book(&self, pair: &TradingPair) -> Result<(), ExchangeError> {
        self.ensure_connected()?;
        if !self.supports_streaming() {
            return Err(ExchangeError::StreamingUnsupported {
                venue: self.inner.venue.clone(),
            });
        }
        self.inner.subscriptions.lock().insert(pair.clone());
        Ok(())
    }

    async fn unsubscribe_order_book(&self, pair: &TradingPair) -> Result<(), ExchangeError> {
        self.inner.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.subscriptions.lock().remove(pair);
        Ok(())
    }

    fn stream_order_book_updates(&self, pair: &TradingPair) -> BookStream {
        if !self.is_connected() {
            let venue = self.inner.venue.clone();
            return stream::once(async move { Err(ExchangeError::NotConnected { venue }) })
                .boxed();
        }

        let rx = self.inner.feed(pair).subscribe();
        stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(book) => return Some((Ok(book), rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    async fn place_market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: Volume,
    ) -> Result<OrderFill, ExchangeError> {
        self.execute(pair, side, quantity, None).await
    }

    async fn place_limit_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        price: Price,
        quantity: Volume,
        time_in_force: TimeInForce,
    ) -> Result<OrderFill, ExchangeError> {
        self.execute(pair, side, quantity, Some((price, time_in_force)))
            .await
    }

    async fn balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        self.ensure_connected()?;
        let mut balances: Vec<Balance> = self
            .inner
            .balances
            .lock()
            .iter()
            .map(|(currency, free)| Balance {
                currency: currency.clone(),
                free: *free,
                locked: Decimal::ZERO,
            })
            .collect();
        balances.sort_by(|a, b| a.currency.cmp(&b.currency));
        Ok(balances)
    }
}

impl Drop for SimulatedExchange {
    fn drop(&mut self) {
        for handle in self.generators.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn pair() -> TradingPair {
        "BTC-USD".parse().unwrap()
    }

    fn book(venue: &str, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> OrderBook {
        OrderBook::new(
            VenueId::from(venue),
            pair(),
            Utc::now(),
            bids.iter().map(|(p, q)| PriceLevel::new(*p, *q)).collect(),
            asks.iter().map(|(p, q)| PriceLevel::new(*p, *q)).collect(),
        )
    }

    async fn connected() -> SimulatedExchange {
        let exchange = SimulatedExchange::new(VenueId::from("sim"), SimulatedSettings::default())
            .with_balance("USD", dec!(100000))
            .with_balance("BTC", dec!(1));
        exchange.connect().await.unwrap();
        exchange
    }

    #[tokio::test]
    async fn market_buy_walks_asks_and_partially_fills() {
        let exchange = connected().await;
        exchange.push_book(book(
            "sim",
            &[],
            &[(dec!(100), dec!(0.2)), (dec!(101), dec!(0.1))],
        ));

        let fill = exchange
            .place_market_order(&pair(), OrderSide::Buy, dec!(0.5))
            .await
            .unwrap();

        assert_eq!(fill.filled_quantity, dec!(0.3));
        assert_eq!(fill.status, OrderStatus::PartiallyFilled);
        // (20 + 10.1) / 0.3
        assert_eq!(fill.average_fill_price.round_dp(4), dec!(100.3333));
        assert_eq!(exchange.balance("BTC"), dec!(1.3));
    }

    #[tokio::test]
    async fn market_sell_requires_base_balance() {
        let exchange = connected().await;
        exchange.push_book(book("sim", &[(dec!(100), dec!(5))], &[]));

        let err = exchange
            .place_market_order(&pair(), OrderSide::Sell, dec!(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::OrderRejected { .. }));
        assert_eq!(exchange.balance("BTC"), dec!(1));
    }

    #[tokio::test]
    async fn fok_limit_fills_nothing_when_short() {
        let exchange = connected().await;
        exchange.push_book(book("sim", &[], &[(dec!(100), dec!(0.2))]));

        let fill = exchange
            .place_limit_order(&pair(), OrderSide::Buy, dec!(100), dec!(0.5), TimeInForce::Fok)
            .await
            .unwrap();
        assert_eq!(fill.status, OrderStatus::Unfilled);
        assert!(!fill.has_fill());
    }

    #[tokio::test]
    async fn limit_stops_at_price() {
        let exchange = connected().await;
        exchange.push_book(book(
            "sim",
            &[],
            &[(dec!(100), dec!(0.2)), (dec!(105), dec!(1))],
        ));

        let fill = exchange
            .place_limit_order(&pair(), OrderSide::Buy, dec!(101), dec!(0.5), TimeInForce::Ioc)
            .await
            .unwrap();
        assert_eq!(fill.filled_quantity, dec!(0.2));
        assert_eq!(fill.status, OrderStatus::PartiallyFilled);
    }

    #[tokio::test]
    async fn stream_delivers_pushed_books() {
        let exchange = connected().await;
        let mut updates = exchange.stream_order_book_updates(&pair());

        exchange.push_book(book("sim", &[(dec!(99), dec!(1))], &[(dec!(100), dec!(1))]));

        let received = updates.next().await.unwrap().unwrap();
        assert_eq!(received.best_bid().unwrap().price(), dec!(99));
    }

    #[tokio::test]
    async fn stream_errors_when_disconnected() {
        let exchange = SimulatedExchange::new(VenueId::from("sim"), SimulatedSettings::default());
        let mut updates = exchange.stream_order_book_updates(&pair());
        assert!(matches!(
            updates.next().await,
            Some(Err(ExchangeError::NotConnected { .. }))
        ));
    }

    #[tokio::test]
    async fn non_streaming_venue_refuses_subscription() {
        let exchange = SimulatedExchange::new(
            VenueId::from("poll"),
            SimulatedSettings {
                streaming: false,
                ..Default::default()
            },
        );
        exchange.connect().await.unwrap();
        assert!(matches!(
            exchange.subscribe_order_book(&pair()).await,
            Err(ExchangeError::StreamingUnsupported { .. })
        ));
    }

    #[tokio::test]
    async fn injected_failure_rejects_orders() {
        let exchange = connected().await;
        exchange.push_book(book("sim", &[], &[(dec!(100), dec!(1))]));
        exchange.fail_orders(Some("maintenance".into()));

        let err = exchange
            .place_market_order(&pair(), OrderSide::Buy, dec!(0.1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("maintenance"));
    }
}
