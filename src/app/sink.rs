//! Result sinks for detected opportunities and trade results.
//!
//! Publishing is fire-and-forget: a sink must return quickly and never fail
//! the caller. Sinks that can fail log the error and drop the event.

use std::io::Write;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::{OpportunitySnapshot, TradeOutcome, TradeResult};

/// Everything a sink can receive.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    Opportunity(OpportunitySnapshot),
    Trade(TradeResult),
}

/// Append-only consumer of engine output.
pub trait ResultSink: Send + Sync {
    fn publish_opportunity(&self, opportunity: &OpportunitySnapshot);

    fn publish_trade(&self, result: &TradeResult);
}

/// Broadcasts to every registered sink.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<Box<dyn ResultSink>>,
}

impl SinkRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Box<dyn ResultSink>) {
        self.sinks.push(sink);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ResultSink for SinkRegistry {
    fn publish_opportunity(&self, opportunity: &OpportunitySnapshot) {
        for sink in &self.sinks {
            sink.publish_opportunity(opportunity);
        }
    }

    fn publish_trade(&self, result: &TradeResult) {
        for sink in &self.sinks {
            sink.publish_trade(result);
        }
    }
}

/// Logs events via tracing.
pub struct LogSink;

impl ResultSink for LogSink {
    fn publish_opportunity(&self, o: &OpportunitySnapshot) {
        info!(
            id = %o.id,
            pair = %o.pair,
            buy_venue = %o.buy_venue,
            buy_price = %o.buy_price,
            sell_venue = %o.sell_venue,
            sell_price = %o.sell_price,
            quantity = %o.quantity,
            spread_pct = %o.spread_percentage.round_dp(4),
            profit = %o.estimated_profit.round_dp(4),
            "Opportunity detected"
        );
    }

    fn publish_trade(&self, result: &TradeResult) {
        match &result.outcome {
            TradeOutcome::Executed => info!(
                opportunity = %result.opportunity_id,
                pair = %result.pair,
                paper = result.paper,
                profit = %result.realized_pnl().round_dp(4),
                "Trade executed"
            ),
            TradeOutcome::Failed { reason } => warn!(
                opportunity = %result.opportunity_id,
                pair = %result.pair,
                paper = result.paper,
                reason = %reason,
                "Trade failed"
            ),
        }
    }
}

/// Forwards events into a bounded tokio channel.
///
/// Events are dropped with a warning when the channel is full or closed.
pub struct ChannelSink {
    tx: mpsc::Sender<SinkEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    fn send(&self, event: SinkEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "Channel sink dropped event");
        }
    }
}

impl ResultSink for ChannelSink {
    fn publish_opportunity(&self, opportunity: &OpportunitySnapshot) {
        self.send(SinkEvent::Opportunity(opportunity.clone()));
    }

    fn publish_trade(&self, result: &TradeResult) {
        self.send(SinkEvent::Trade(result.clone()));
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write(&self, event: &SinkEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize sink event");
                return;
            }
        };
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            warn!(error = %e, "Failed to write sink event");
        }
    }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    fn publish_opportunity(&self, opportunity: &OpportunitySnapshot) {
        self.write(&SinkEvent::Opportunity(opportunity.clone()));
    }

    fn publish_trade(&self, result: &TradeResult) {
        self.write(&SinkEvent::Trade(result.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureReason, Opportunity, VenueId};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot() -> OpportunitySnapshot {
        Opportunity::builder()
            .pair("BTC-USD".parse().unwrap())
            .buy(VenueId::from("a"), dec!(100))
            .sell(VenueId::from("b"), dec!(101))
            .quantity(dec!(1))
            .build()
            .unwrap()
            .snapshot()
    }

    fn failed_trade() -> TradeResult {
        let snap = snapshot();
        TradeResult::failed(
            snap.id,
            snap.pair,
            true,
            None,
            None,
            FailureReason::ConcurrencyLimit,
        )
    }

    struct Counting(Arc<AtomicUsize>);

    impl ResultSink for Counting {
        fn publish_opportunity(&self, _: &OpportunitySnapshot) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn publish_trade(&self, _: &TradeResult) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn registry_fans_out() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut registry = SinkRegistry::new();
        registry.register(Box::new(Counting(count.clone())));
        registry.register(Box::new(Counting(count.clone())));
        registry.register(Box::new(LogSink));

        registry.publish_opportunity(&snapshot());
        registry.publish_trade(&failed_trade());

        assert_eq!(registry.len(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.publish_trade(&failed_trade());

        match rx.recv().await.unwrap() {
            SinkEvent::Trade(result) => assert!(!result.is_executed()),
            SinkEvent::Opportunity(_) => panic!("expected trade event"),
        }
    }

    #[test]
    fn json_lines_sink_writes_one_line_per_event() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.publish_opportunity(&snapshot());
        sink.publish_trade(&failed_trade());

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "opportunity");
        assert_eq!(first["buy_venue"], "a");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "trade");
        assert_eq!(second["outcome"]["reason"]["kind"], "concurrency_limit");
    }
}
