//! Engine runtime: wires configuration, venues and services together and
//! drives detection and execution until shutdown.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::aggregator::MarketDataAggregator;
use super::detector::{ArbitrageDetector, CapitalResolver};
use super::executor::TradeOrchestrator;
use super::paper::PaperLedger;
use super::risk::RiskEngine;
use super::sink::{LogSink, ResultSink, SinkRegistry};
use super::store::OrderBookStore;
use crate::config::{Config, ConfigSource, SharedConfig};
use crate::domain::{Opportunity, TradingPair};
use crate::error::Result;
use crate::exchange::{ClientRegistry, ExchangeFactory};

/// Fully wired engine.
pub struct Engine {
    config: Arc<SharedConfig>,
    clients: ClientRegistry,
    ledger: Arc<PaperLedger>,
    risk: Arc<RiskEngine>,
    aggregator: Arc<MarketDataAggregator>,
    detector: Arc<ArbitrageDetector>,
    orchestrator: Arc<TradeOrchestrator>,
    auto_execute: bool,
}

impl Engine {
    /// Build every component from `config`.
    ///
    /// `sinks` receive all output in addition to the log sink. When `live`
    /// is set, paper trading is turned off regardless of the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured venue kind is unsupported.
    pub fn from_config(config: &Config, live: bool, mut sinks: SinkRegistry) -> Result<Self> {
        let shared = Arc::new(SharedConfig::from_config(config));
        if live {
            shared.set_paper_trading(false);
        }

        let clients = ExchangeFactory::create_all(&config.venues)?;

        let ledger = Arc::new(PaperLedger::new());
        for balance in &config.paper.balances {
            ledger.deposit(&balance.venue, &balance.currency, balance.amount);
        }

        sinks.register(Box::new(LogSink));
        let sink: Arc<dyn ResultSink> = Arc::new(sinks);

        Ok(Self::assemble(
            shared,
            clients,
            ledger,
            sink,
            config.detection.channel_capacity,
            config.execution.auto_execute,
        ))
    }

    /// Wire pre-built parts together.
    #[must_use]
    pub fn assemble(
        config: Arc<SharedConfig>,
        clients: ClientRegistry,
        ledger: Arc<PaperLedger>,
        sink: Arc<dyn ResultSink>,
        channel_capacity: usize,
        auto_execute: bool,
    ) -> Self {
        let source: Arc<dyn ConfigSource> = config.clone();
        let risk = Arc::new(RiskEngine::new());
        let store = Arc::new(OrderBookStore::new());
        let aggregator = Arc::new(MarketDataAggregator::new(
            clients.clone(),
            store,
            Arc::clone(&source),
        ));
        let detector = Arc::new(ArbitrageDetector::new(
            Arc::clone(&aggregator),
            Arc::clone(&risk),
            Arc::clone(&source),
            CapitalResolver::new(Arc::clone(&ledger), clients.clone()),
            Arc::clone(&sink),
            channel_capacity,
        ));
        let orchestrator = Arc::new(TradeOrchestrator::new(
            clients.clone(),
            Arc::clone(&ledger),
            Arc::clone(&risk),
            source,
            sink,
        ));

        Self {
            config,
            clients,
            ledger,
            risk,
            aggregator,
            detector,
            orchestrator,
            auto_execute,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Arc<SharedConfig> {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<PaperLedger> {
        &self.ledger
    }

    #[must_use]
    pub fn risk(&self) -> &Arc<RiskEngine> {
        &self.risk
    }

    #[must_use]
    pub fn aggregator(&self) -> &Arc<MarketDataAggregator> {
        &self.aggregator
    }

    #[must_use]
    pub fn detector(&self) -> &Arc<ArbitrageDetector> {
        &self.detector
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<TradeOrchestrator> {
        &self.orchestrator
    }

    /// Scan all configured pairs until `shutdown` flips to `true`.
    ///
    /// Detected opportunities are executed in their own tasks when
    /// auto-execution is on. In-flight executions are awaited before
    /// returning; each is bounded by the execution deadline.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let pairs: Vec<TradingPair> = self.config.pairs();
        let mut opportunities = self.detector.subscribe_opportunities();
        info!(
            pairs = pairs.len(),
            venues = self.clients.len(),
            paper = self.config.paper_trading(),
            auto_execute = self.auto_execute,
            "Engine starting"
        );
        self.detector.start(&pairs).await;

        let mut executions = JoinSet::new();
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = opportunities.recv() => match received {
                    Ok(opportunity) => {
                        if self.auto_execute {
                            spawn_execution(&mut executions, Arc::clone(&self.orchestrator), opportunity);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Opportunity channel lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(joined) = executions.join_next(), if !executions.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Execution task panicked");
                    }
                }
            }
        }

        info!("Engine stopping");
        self.detector.stop().await;
        self.aggregator.shutdown().await;
        while let Some(joined) = executions.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Execution task panicked");
            }
        }
        for client in self.clients.iter() {
            if let Err(e) = client.disconnect().await {
                warn!(venue = %client.venue(), error = %e, "Disconnect failed");
            }
        }
        info!(open_trades = self.risk.open_trades(), "Engine stopped");
    }
}

/// Spawn async execution without blocking opportunity intake.
fn spawn_execution(
    executions: &mut JoinSet<()>,
    orchestrator: Arc<TradeOrchestrator>,
    opportunity: Arc<Opportunity>,
) {
    executions.spawn(async move {
        let result = orchestrator.execute(&opportunity, None, None).await;
        if !result.is_executed() {
            info!(
                opportunity = %opportunity.id(),
                status = %opportunity.status(),
                "Execution did not complete"
            );
        }
    });
}
