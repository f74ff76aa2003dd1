//! Arbitrage detection engine.
//!
//! Runs one scanning task per active pair. Each task consumes the
//! aggregator's best-quote stream, turns a cross-venue crossed book into a
//! [`TradeCandidate`], sizes it through the risk engine and publishes the
//! resulting [`Opportunity`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::aggregator::MarketDataAggregator;
use super::paper::PaperLedger;
use super::risk::{RiskDecision, RiskEngine, TradeCandidate};
use super::sink::ResultSink;
use crate::config::ConfigSource;
use crate::domain::{BestQuotes, Opportunity, Price, TradingPair, VenueId};
use crate::exchange::ClientRegistry;

const SCANNER_STOP_GRACE: Duration = Duration::from_secs(1);

/// Build a candidate from the best quotes, if they describe a cross-venue
/// arbitrage that is fresh enough to act on.
///
/// Requires distinct venues, `ask < bid`, positive quantity on both sides
/// and both quotes no older than `max_age`.
#[must_use]
pub fn find_candidate(
    best: &BestQuotes,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Option<TradeCandidate> {
    let (bid, ask) = (best.bid.as_ref()?, best.ask.as_ref()?);
    if bid.venue == ask.venue || ask.price >= bid.price {
        return None;
    }
    if bid.quantity <= Decimal::ZERO || ask.quantity <= Decimal::ZERO {
        return None;
    }
    let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
    if bid.is_stale(now, max_age) || ask.is_stale(now, max_age) {
        debug!(pair = %best.pair, "Ignoring stale quotes");
        return None;
    }

    Some(TradeCandidate {
        pair: best.pair.clone(),
        buy_venue: ask.venue.clone(),
        buy_price: ask.price,
        sell_venue: bid.venue.clone(),
        sell_price: bid.price,
        quantity: bid.quantity.min(ask.quantity),
    })
}

/// Resolves the capital available for a trade's buy leg.
#[derive(Clone)]
pub struct CapitalResolver {
    ledger: Arc<PaperLedger>,
    clients: ClientRegistry,
}

impl CapitalResolver {
    #[must_use]
    pub fn new(ledger: Arc<PaperLedger>, clients: ClientRegistry) -> Self {
        Self { ledger, clients }
    }

    /// Free balance of `currency` on `venue`: the paper ledger in paper
    /// mode, the venue's reported balances otherwise. Errors count as zero.
    pub async fn available(&self, venue: &VenueId, currency: &str, paper: bool) -> Decimal {
        if paper {
            return self.ledger.balance(venue, currency);
        }
        let Some(client) = self.clients.get(venue) else {
            warn!(venue = %venue, "No client for capital lookup");
            return Decimal::ZERO;
        };
        match client.balances().await {
            Ok(balances) => balances
                .iter()
                .find(|b| b.currency.eq_ignore_ascii_case(currency))
                .map_or(Decimal::ZERO, |b| b.free),
            Err(e) => {
                warn!(venue = %venue, error = %e, "Failed to fetch balances");
                Decimal::ZERO
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Signal {
    buy_venue: VenueId,
    sell_venue: VenueId,
    buy_price: Price,
    sell_price: Price,
}

struct Scanner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    aggregator: Arc<MarketDataAggregator>,
    risk: Arc<RiskEngine>,
    config: Arc<dyn ConfigSource>,
    capital: CapitalResolver,
    sink: Arc<dyn ResultSink>,
    tx: broadcast::Sender<Arc<Opportunity>>,
    last_signal: Mutex<HashMap<TradingPair, (Signal, Instant)>>,
}

impl Inner {
    async fn evaluate(&self, best: &BestQuotes) -> Option<Arc<Opportunity>> {
        let detection = self.config.detection();
        let candidate = find_candidate(best, Utc::now(), detection.quote_staleness)?;
        if self.is_duplicate(&candidate, detection.dedup_window) {
            return None;
        }

        let profile = self.config.risk_profile();
        let paper = self.config.paper_trading();
        let capital = self
            .capital
            .available(&candidate.buy_venue, candidate.pair.quote(), paper)
            .await;

        let quantity = match self.risk.check(&candidate, &profile, capital) {
            RiskDecision::Accept { quantity } => quantity,
            RiskDecision::Reject(_) => return None,
        };

        let opportunity = match Opportunity::builder()
            .pair(candidate.pair.clone())
            .buy(candidate.buy_venue.clone(), candidate.buy_price)
            .sell(candidate.sell_venue.clone(), candidate.sell_price)
            .quantity(quantity)
            .build()
        {
            Ok(o) => Arc::new(o),
            Err(e) => {
                warn!(pair = %candidate.pair, error = %e, "Failed to build opportunity");
                return None;
            }
        };

        self.remember(&candidate);
        self.sink.publish_opportunity(&opportunity.snapshot());
        // No subscribers is fine.
        let _ = self.tx.send(Arc::clone(&opportunity));
        Some(opportunity)
    }

    fn is_duplicate(&self, candidate: &TradeCandidate, window: Duration) -> bool {
        let signal = signal_of(candidate);
        self.last_signal
            .lock()
            .get(&candidate.pair)
            .is_some_and(|(last, at)| *last == signal && at.elapsed() < window)
    }

    fn remember(&self, candidate: &TradeCandidate) {
        self.last_signal
            .lock()
            .insert(candidate.pair.clone(), (signal_of(candidate), Instant::now()));
    }
}

fn signal_of(candidate: &TradeCandidate) -> Signal {
    Signal {
        buy_venue: candidate.buy_venue.clone(),
        sell_venue: candidate.sell_venue.clone(),
        buy_price: candidate.buy_price,
        sell_price: candidate.sell_price,
    }
}

/// Continuous opportunity detector.
pub struct ArbitrageDetector {
    inner: Arc<Inner>,
    running: Mutex<bool>,
    scanners: Mutex<HashMap<TradingPair, Scanner>>,
}

impl ArbitrageDetector {
    #[must_use]
    pub fn new(
        aggregator: Arc<MarketDataAggregator>,
        risk: Arc<RiskEngine>,
        config: Arc<dyn ConfigSource>,
        capital: CapitalResolver,
        sink: Arc<dyn ResultSink>,
        channel_capacity: usize,
    ) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                aggregator,
                risk,
                config,
                capital,
                sink,
                tx,
                last_signal: Mutex::new(HashMap::new()),
            }),
            running: Mutex::new(false),
            scanners: Mutex::new(HashMap::new()),
        }
    }

    /// Receive every opportunity emitted after this call.
    #[must_use]
    pub fn subscribe_opportunities(&self) -> broadcast::Receiver<Arc<Opportunity>> {
        self.inner.tx.subscribe()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }

    /// Pairs currently being scanned, sorted.
    #[must_use]
    pub fn active_pairs(&self) -> Vec<TradingPair> {
        let mut pairs: Vec<_> = self.scanners.lock().keys().cloned().collect();
        pairs.sort();
        pairs
    }

    /// Start scanning `pairs`. Pairs already scanned are left alone.
    pub async fn start(&self, pairs: &[TradingPair]) {
        *self.running.lock() = true;
        info!(pairs = pairs.len(), "Detector starting");
        for pair in pairs {
            self.add_trading_pair(pair).await;
        }
    }

    /// Stop all scanning tasks and their subscriptions. Safe to call twice.
    pub async fn stop(&self) {
        let was_running = std::mem::replace(&mut *self.running.lock(), false);
        let scanners: Vec<_> = self.scanners.lock().drain().collect();
        for (pair, scanner) in scanners {
            self.stop_scanner(&pair, scanner).await;
        }
        if was_running {
            info!("Detector stopped");
        }
    }

    /// Begin scanning `pair`. Returns `false` if the detector is stopped or
    /// the pair is already active.
    pub async fn add_trading_pair(&self, pair: &TradingPair) -> bool {
        if !self.is_running() || self.scanners.lock().contains_key(pair) {
            return false;
        }

        let quotes = self.inner.aggregator.aggregated_quotes(pair);
        let report = self.inner.aggregator.subscribe(pair).await;
        if !report.any_active() {
            warn!(pair = %pair, "No venue is streaming this pair");
        }

        let stopped = {
            // `stop` clears `running` before draining scanners.
            let mut scanners = self.scanners.lock();
            if scanners.contains_key(pair) {
                return false;
            }
            if self.is_running() {
                let (shutdown, shutdown_rx) = watch::channel(false);
                let handle = tokio::spawn(scan(
                    Arc::clone(&self.inner),
                    pair.clone(),
                    quotes,
                    shutdown_rx,
                ));
                scanners.insert(pair.clone(), Scanner { shutdown, handle });
                false
            } else {
                true
            }
        };
        if stopped {
            debug!(pair = %pair, "Detector stopped while subscribing, backing out");
            self.inner.aggregator.unsubscribe_pair(pair).await;
            return false;
        }

        let venues = report.subscribed.len() + report.already_active.len();
        info!(pair = %pair, venues, "Scanning pair");
        true
    }

    /// Stop scanning `pair` without touching other pairs.
    pub async fn remove_trading_pair(&self, pair: &TradingPair) -> bool {
        let Some(scanner) = self.scanners.lock().remove(pair) else {
            return false;
        };
        self.stop_scanner(pair, scanner).await;
        true
    }

    async fn stop_scanner(&self, pair: &TradingPair, mut scanner: Scanner) {
        let _ = scanner.shutdown.send(true);
        if tokio::time::timeout(SCANNER_STOP_GRACE, &mut scanner.handle)
            .await
            .is_err()
        {
            scanner.handle.abort();
        }
        self.inner.aggregator.unsubscribe_pair(pair).await;
        self.inner.last_signal.lock().remove(pair);
        info!(pair = %pair, "Stopped scanning pair");
    }
}

async fn scan(
    inner: Arc<Inner>,
    pair: TradingPair,
    mut quotes: BoxStream<'static, BestQuotes>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Books may already be cached from an earlier subscription.
    inner.evaluate(&inner.aggregator.best_quotes(&pair)).await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            best = quotes.next() => match best {
                Some(best) => {
                    inner.evaluate(&best).await;
                }
                None => {
                    warn!(pair = %pair, "Quote stream ended");
                    break;
                }
            },
        }
    }
    debug!(pair = %pair, "Scanner exited");
}
