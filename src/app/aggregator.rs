//! Market data aggregation.
//!
//! Keeps exactly one consumer task per (venue, pair), each writing inbound
//! books into the shared [`OrderBookStore`]. Quotes are read back either by
//! polling [`MarketDataAggregator::best_quotes`] or through the push streams
//! built on the store's update notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::OrderBookStore;
use crate::config::ConfigSource;
use crate::domain::{
    BestQuotes, OrderBook, PriceLevel, PriceQuote, TradingPair, VenueId, VenueQuote,
};
use crate::exchange::{BookStream, ClientRegistry, ExchangeClient};

/// How long `unsubscribe` waits for a consumer to exit before aborting it.
const CONSUMER_STOP_GRACE: Duration = Duration::from_secs(1);

type ConsumerKey = (VenueId, TradingPair);

struct Consumer {
    generation: u64,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

type ConsumerMap = Arc<Mutex<HashMap<ConsumerKey, Consumer>>>;

/// A venue that `subscribe` did not start a consumer for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedVenue {
    pub venue: VenueId,
    pub reason: String,
}

/// Per-venue outcome of [`MarketDataAggregator::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeReport {
    pub pair: TradingPair,
    /// Venues a new consumer was started for.
    pub subscribed: Vec<VenueId>,
    /// Venues that already had a consumer and were left alone.
    pub already_active: Vec<VenueId>,
    pub skipped: Vec<SkippedVenue>,
}

impl SubscribeReport {
    fn new(pair: TradingPair) -> Self {
        Self {
            pair,
            subscribed: Vec::new(),
            already_active: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn skip(&mut self, venue: &VenueId, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(venue = %venue, pair = %self.pair, reason = %reason, "Skipping venue");
        self.skipped.push(SkippedVenue {
            venue: venue.clone(),
            reason,
        });
    }

    /// Whether at least one venue is streaming the pair after the call.
    #[must_use]
    pub fn any_active(&self) -> bool {
        !self.subscribed.is_empty() || !self.already_active.is_empty()
    }
}

/// Fans venue order book streams into the store.
pub struct MarketDataAggregator {
    clients: ClientRegistry,
    store: Arc<OrderBookStore>,
    config: Arc<dyn ConfigSource>,
    consumers: ConsumerMap,
    next_generation: AtomicU64,
}

impl MarketDataAggregator {
    #[must_use]
    pub fn new(
        clients: ClientRegistry,
        store: Arc<OrderBookStore>,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            clients,
            store,
            config,
            consumers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<OrderBookStore> {
        &self.store
    }

    /// Start a consumer for every venue enabled for `pair`.
    ///
    /// Venues that already have one are left untouched. Venues that are
    /// unknown, cannot connect, cannot stream or refuse the subscription are
    /// reported in [`SubscribeReport::skipped`] without affecting the others.
    pub async fn subscribe(&self, pair: &TradingPair) -> SubscribeReport {
        let mut report = SubscribeReport::new(pair.clone());

        for venue in self.config.enabled_venues(pair) {
            let key = (venue.clone(), pair.clone());
            if self.consumers.lock().contains_key(&key) {
                report.already_active.push(venue);
                continue;
            }

            let Some(client) = self.clients.get(&venue) else {
                report.skip(&venue, "no client registered");
                continue;
            };

            if !client.is_connected() {
                if let Err(e) = client.connect().await {
                    report.skip(&venue, e.to_string());
                    continue;
                }
            }

            if !client.supports_streaming() {
                report.skip(&venue, "streaming not supported");
                continue;
            }

            if let Err(e) = client.subscribe_order_book(pair).await {
                report.skip(&venue, e.to_string());
                continue;
            }

            if self.start_consumer(key, client) {
                info!(venue = %venue, pair = %pair, "Subscribed to order book");
                report.subscribed.push(venue);
            } else {
                report.already_active.push(venue);
            }
        }

        report
    }

    /// Spawn the consumer unless another call got there first.
    fn start_consumer(&self, key: ConsumerKey, client: Arc<dyn ExchangeClient>) -> bool {
        let mut consumers = self.consumers.lock();
        if consumers.contains_key(&key) {
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stream = client.stream_order_book_updates(&key.1);
        let handle = tokio::spawn(consume(
            key.clone(),
            generation,
            stream,
            client,
            Arc::clone(&self.store),
            Arc::clone(&self.consumers),
            shutdown_rx,
        ));

        consumers.insert(
            key,
            Consumer {
                generation,
                shutdown,
                handle,
            },
        );
        true
    }

    /// Stop the consumer for (venue, pair) and drop its cached book.
    ///
    /// Venue-side unsubscribe failures are logged. Calling this for a key
    /// with no consumer does nothing.
    pub async fn unsubscribe(&self, venue: &VenueId, pair: &TradingPair) {
        let key = (venue.clone(), pair.clone());
        let Some(mut consumer) = self.consumers.lock().remove(&key) else {
            return;
        };

        let _ = consumer.shutdown.send(true);
        if tokio::time::timeout(CONSUMER_STOP_GRACE, &mut consumer.handle)
            .await
            .is_err()
        {
            warn!(venue = %venue, pair = %pair, "Consumer did not stop in time, aborting");
            consumer.handle.abort();
        }

        if let Some(client) = self.clients.get(venue) {
            if let Err(e) = client.unsubscribe_order_book(pair).await {
                warn!(venue = %venue, pair = %pair, error = %e, "Venue unsubscribe failed");
            }
        }
        self.store.remove(venue, pair);
        info!(venue = %venue, pair = %pair, "Unsubscribed from order book");
    }

    /// Unsubscribe every venue of `pair`.
    pub async fn unsubscribe_pair(&self, pair: &TradingPair) {
        for venue in self.active_venues(pair) {
            self.unsubscribe(&venue, pair).await;
        }
    }

    /// Unsubscribe everything.
    pub async fn shutdown(&self) {
        let keys: Vec<ConsumerKey> = self.consumers.lock().keys().cloned().collect();
        for (venue, pair) in keys {
            self.unsubscribe(&venue, &pair).await;
        }
    }

    /// Venues with a running consumer for `pair`, sorted.
    #[must_use]
    pub fn active_venues(&self, pair: &TradingPair) -> Vec<VenueId> {
        let mut venues: Vec<_> = self
            .consumers
            .lock()
            .keys()
            .filter(|(_, p)| p == pair)
            .map(|(v, _)| v.clone())
            .collect();
        venues.sort();
        venues
    }

    /// Current best bid and ask for `pair` across venues.
    #[must_use]
    pub fn best_quotes(&self, pair: &TradingPair) -> BestQuotes {
        self.store.best_across_venues(pair)
    }

    /// Top of book for one venue, emitted on every update of its book.
    ///
    /// Dropping the stream cancels it.
    pub fn venue_quotes(
        &self,
        venue: &VenueId,
        pair: &TradingPair,
    ) -> BoxStream<'static, VenueQuote> {
        let state = (
            self.store.subscribe(),
            Arc::clone(&self.store),
            venue.clone(),
            pair.clone(),
        );
        stream::unfold(state, |(mut rx, store, venue, pair)| async move {
            loop {
                match rx.recv().await {
                    Ok(update) if update.venue == venue && update.pair == pair => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(venue = %venue, pair = %pair, skipped, "Quote stream lagged");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
            let quote = venue_quote(&store, &venue, &pair);
            Some((quote, (rx, store, venue, pair)))
        })
        .boxed()
    }

    /// Best quotes across venues, recomputed on every update for `pair`.
    ///
    /// The stream never ends while the store lives. Each call returns an
    /// independent stream.
    pub fn aggregated_quotes(&self, pair: &TradingPair) -> BoxStream<'static, BestQuotes> {
        let state = (self.store.subscribe(), Arc::clone(&self.store), pair.clone());
        stream::unfold(state, |(mut rx, store, pair)| async move {
            loop {
                match rx.recv().await {
                    Ok(update) if update.pair == pair => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(pair = %pair, skipped, "Aggregated stream lagged");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
            let best = store.best_across_venues(&pair);
            Some((best, (rx, store, pair)))
        })
        .boxed()
    }
}

fn venue_quote(store: &OrderBookStore, venue: &VenueId, pair: &TradingPair) -> VenueQuote {
    let book = store.get(venue, pair);
    let side = |level: Option<&PriceLevel>, book: &OrderBook| {
        level.map(|level| PriceQuote {
            venue: venue.clone(),
            price: level.price(),
            quantity: level.quantity(),
            timestamp: book.timestamp(),
        })
    };
    VenueQuote {
        venue: venue.clone(),
        pair: pair.clone(),
        bid: book.as_ref().and_then(|b| side(b.best_bid(), b)),
        ask: book.as_ref().and_then(|b| side(b.best_ask(), b)),
    }
}

/// Consumer task: copy books into the store until told to stop or the
/// stream fails.
async fn consume(
    key: ConsumerKey,
    generation: u64,
    mut stream: BookStream,
    client: Arc<dyn ExchangeClient>,
    store: Arc<OrderBookStore>,
    consumers: ConsumerMap,
    mut shutdown: watch::Receiver<bool>,
) {
    let (venue, pair) = &key;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(venue = %venue, pair = %pair, "Consumer stopping");
                return;
            }
            item = stream.next() => match item {
                Some(Ok(book)) if book.pair() != pair => {
                    debug!(
                        venue = %venue,
                        pair = %pair,
                        got = %book.pair(),
                        "Dropping book for another pair"
                    );
                }
                Some(Ok(book)) => store.put(venue.clone(), pair.clone(), book),
                Some(Err(e)) => {
                    warn!(venue = %venue, pair = %pair, error = %e, "Order book stream failed");
                    break;
                }
                None => {
                    info!(venue = %venue, pair = %pair, "Order book stream ended");
                    break;
                }
            },
        }
    }

    drop(stream);
    if let Err(e) = client.unsubscribe_order_book(pair).await {
        debug!(venue = %venue, pair = %pair, error = %e, "Cleanup unsubscribe failed");
    }

    let owned = {
        let mut consumers = consumers.lock();
        let owned = consumers
            .get(&key)
            .is_some_and(|consumer| consumer.generation == generation);
        if owned {
            consumers.remove(&key);
        }
        owned
    };
    if owned {
        store.remove(venue, pair);
    }
}
