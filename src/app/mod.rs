//! Application layer: market data, detection, risk and execution services.

mod aggregator;
mod detector;
mod engine;
mod executor;
mod paper;
mod risk;
mod sink;
mod store;

pub use aggregator::{MarketDataAggregator, SkippedVenue, SubscribeReport};
pub use detector::{find_candidate, ArbitrageDetector, CapitalResolver};
pub use engine::Engine;
pub use executor::TradeOrchestrator;
pub use paper::{PaperFill, PaperLedger, PaperOrder};
pub use risk::{RiskContext, RiskDecision, RiskEngine, RiskRejection, TradeCandidate};
pub use sink::{ChannelSink, JsonLinesSink, LogSink, ResultSink, SinkEvent, SinkRegistry};
pub use store::{BookUpdate, OrderBookStore};
