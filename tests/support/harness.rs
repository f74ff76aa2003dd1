//! Two simulated venues wired into a full engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use spreadwatch::app::{ArbitrageDetector, Engine, PaperLedger, ResultSink, RiskEngine, TradeOrchestrator};
use spreadwatch::config::SharedConfig;
use spreadwatch::domain::{Opportunity, RiskProfile, VenueId};
use spreadwatch::exchange::{ClientRegistry, ExchangeClient, SimulatedExchange, SimulatedSettings};

use super::book::btc_usd;
use super::sink::RecordingSink;

pub struct Harness {
    pub engine: Engine,
    pub config: Arc<SharedConfig>,
    pub ledger: Arc<PaperLedger>,
    pub sink: Arc<RecordingSink>,
    pub venue_a: Arc<SimulatedExchange>,
    pub venue_b: Arc<SimulatedExchange>,
}

impl Harness {
    /// Venues `a` and `b` both enabled for BTC-USD.
    pub async fn new(profile: RiskProfile, paper: bool) -> Self {
        Self::with_settings(profile, paper, SimulatedSettings::default()).await
    }

    pub async fn with_settings(
        profile: RiskProfile,
        paper: bool,
        settings: SimulatedSettings,
    ) -> Self {
        let venue_a = Arc::new(SimulatedExchange::new(VenueId::from("a"), settings.clone()));
        let venue_b = Arc::new(SimulatedExchange::new(VenueId::from("b"), settings));
        venue_a.connect().await.unwrap();
        venue_b.connect().await.unwrap();

        let mut clients = ClientRegistry::new();
        clients.insert(venue_a.clone() as Arc<dyn ExchangeClient>);
        clients.insert(venue_b.clone() as Arc<dyn ExchangeClient>);

        let mut pairs = BTreeMap::new();
        pairs.insert(btc_usd(), vec![VenueId::from("a"), VenueId::from("b")]);
        let config = Arc::new(SharedConfig::new(profile, pairs, paper));

        let ledger = Arc::new(PaperLedger::new());
        let sink = Arc::new(RecordingSink::default());
        let engine = Engine::assemble(
            Arc::clone(&config),
            clients,
            Arc::clone(&ledger),
            sink.clone() as Arc<dyn ResultSink>,
            64,
            true,
        );

        Self {
            engine,
            config,
            ledger,
            sink,
            venue_a,
            venue_b,
        }
    }

    pub fn detector(&self) -> &Arc<ArbitrageDetector> {
        self.engine.detector()
    }

    pub fn orchestrator(&self) -> &Arc<TradeOrchestrator> {
        self.engine.orchestrator()
    }

    pub fn risk(&self) -> &Arc<RiskEngine> {
        self.engine.risk()
    }
}

/// Profile that accepts any positive spread and commits all capital.
pub fn permissive_profile() -> RiskProfile {
    RiskProfile {
        min_profit_percentage: dec!(0.1),
        max_capital_per_trade_percentage: dec!(100),
        ..RiskProfile::default()
    }
}

/// A detected opportunity: buy `a` at 50000, sell `b` at 50300.
pub fn opportunity(quantity: rust_decimal::Decimal) -> Opportunity {
    Opportunity::builder()
        .pair(btc_usd())
        .buy(VenueId::from("a"), dec!(50000))
        .sell(VenueId::from("b"), dec!(50300))
        .quantity(quantity)
        .build()
        .unwrap()
}

/// Wait for the next opportunity, failing after `limit`.
pub async fn next_opportunity(
    rx: &mut tokio::sync::broadcast::Receiver<Arc<Opportunity>>,
    limit: Duration,
) -> Option<Arc<Opportunity>> {
    tokio::time::timeout(limit, rx.recv()).await.ok()?.ok()
}
