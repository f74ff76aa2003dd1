use parking_lot::Mutex;

use spreadwatch::app::ResultSink;
use spreadwatch::domain::{OpportunitySnapshot, TradeResult};

/// Sink that records everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    opportunities: Mutex<Vec<OpportunitySnapshot>>,
    trades: Mutex<Vec<TradeResult>>,
}

impl RecordingSink {
    pub fn opportunities(&self) -> Vec<OpportunitySnapshot> {
        self.opportunities.lock().clone()
    }

    pub fn trades(&self) -> Vec<TradeResult> {
        self.trades.lock().clone()
    }
}

impl ResultSink for RecordingSink {
    fn publish_opportunity(&self, opportunity: &OpportunitySnapshot) {
        self.opportunities.lock().push(opportunity.clone());
    }

    fn publish_trade(&self, result: &TradeResult) {
        self.trades.lock().push(result.clone());
    }
}
