//! Trade execution orchestrator.
//!
//! Executes the buy leg, then sells exactly what the buy filled. There is no
//! unwind: a failed sell leaves the bought position open and is reported in
//! the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::paper::{PaperFill, PaperLedger, PaperOrder};
use super::risk::RiskEngine;
use super::sink::ResultSink;
use crate::config::ConfigSource;
use crate::domain::{
    percent_of, FailureReason, LegResult, Opportunity, OpportunityStatus, OrderSide, Percent,
    Price, RiskProfile, TradeResult, TradingPair, VenueId, Volume,
};
use crate::error::LedgerError;
use crate::exchange::ClientRegistry;

/// Legs completed so far; survives a deadline expiry.
#[derive(Default)]
struct Progress {
    buy: Option<LegResult>,
    sell: Option<LegResult>,
}

/// One leg to place.
struct LegRequest<'a> {
    venue: &'a VenueId,
    pair: &'a TradingPair,
    side: OrderSide,
    price: Price,
    quantity: Volume,
}

/// Executes approved opportunities live or on paper.
pub struct TradeOrchestrator {
    clients: ClientRegistry,
    ledger: Arc<PaperLedger>,
    risk: Arc<RiskEngine>,
    config: Arc<dyn ConfigSource>,
    sink: Arc<dyn ResultSink>,
}

impl TradeOrchestrator {
    #[must_use]
    pub fn new(
        clients: ClientRegistry,
        ledger: Arc<PaperLedger>,
        risk: Arc<RiskEngine>,
        config: Arc<dyn ConfigSource>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            clients,
            ledger,
            risk,
            config,
            sink,
        }
    }

    /// Execute both legs of `opportunity`.
    ///
    /// `quantity` overrides the opportunity's quantity; `timeout` overrides
    /// the configured deadline. Never fails: every outcome, including
    /// ineligibility, is a [`TradeResult`] that is also published.
    pub async fn execute(
        &self,
        opportunity: &Opportunity,
        quantity: Option<Volume>,
        timeout: Option<Duration>,
    ) -> TradeResult {
        let quantity = quantity.unwrap_or_else(|| opportunity.quantity());
        let settings = self.config.execution();
        let paper = self.config.paper_trading();

        if let Err(detail) = self.check_eligible(opportunity, quantity) {
            debug!(opportunity = %opportunity.id(), detail = %detail, "Opportunity ineligible");
            return self.publish(TradeResult::failed(
                opportunity.id(),
                opportunity.pair().clone(),
                paper,
                None,
                None,
                FailureReason::Ineligible { detail },
            ));
        }

        if let Err(e) = opportunity.mark_executing() {
            // Claimed by another executor since the eligibility check.
            return self.publish(TradeResult::failed(
                opportunity.id(),
                opportunity.pair().clone(),
                paper,
                None,
                None,
                FailureReason::Ineligible {
                    detail: e.to_string(),
                },
            ));
        }

        let profile = self.config.risk_profile();
        if !self.risk.try_begin_trade(profile.max_concurrent_trades) {
            let reason = FailureReason::ConcurrencyLimit;
            if let Err(e) = opportunity.mark_failed(reason.to_string()) {
                warn!(opportunity = %opportunity.id(), error = %e, "Status update failed");
            }
            return self.publish(TradeResult::failed(
                opportunity.id(),
                opportunity.pair().clone(),
                paper,
                None,
                None,
                reason,
            ));
        }

        let deadline = timeout.unwrap_or(settings.timeout);
        info!(
            opportunity = %opportunity.id(),
            pair = %opportunity.pair(),
            quantity = %quantity,
            paper,
            "Executing opportunity"
        );

        let progress = Mutex::new(Progress::default());
        let legs = self.run_legs(
            opportunity,
            quantity,
            paper,
            settings.paper_fee_rate,
            &profile,
            &progress,
        );
        let outcome = match tokio::time::timeout(deadline, legs).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FailureReason::timeout(deadline)),
        };

        let Progress { buy, sell } = progress.into_inner();
        let result = match (outcome, buy, sell) {
            (Ok(()), Some(buy), Some(sell)) => {
                if let Err(e) = opportunity.mark_executed() {
                    warn!(opportunity = %opportunity.id(), error = %e, "Status update failed");
                }
                TradeResult::executed(
                    opportunity.id(),
                    opportunity.pair().clone(),
                    paper,
                    buy,
                    sell,
                )
            }
            (outcome, buy, sell) => {
                let reason = outcome.err().unwrap_or(FailureReason::BuyNotFilled);
                if let Err(e) = opportunity.mark_failed(reason.to_string()) {
                    warn!(opportunity = %opportunity.id(), error = %e, "Status update failed");
                }
                TradeResult::failed(
                    opportunity.id(),
                    opportunity.pair().clone(),
                    paper,
                    buy,
                    sell,
                    reason,
                )
            }
        };

        self.risk.finish_trade(result.realized_pnl());
        self.publish(result)
    }

    fn publish(&self, result: TradeResult) -> TradeResult {
        self.sink.publish_trade(&result);
        result
    }

    fn check_eligible(&self, opportunity: &Opportunity, quantity: Volume) -> Result<(), String> {
        if opportunity.status() != OpportunityStatus::Detected {
            return Err(format!("status is {}", opportunity.status()));
        }
        let ttl = self.config.detection().opportunity_ttl;
        let max_age = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        if opportunity.is_stale(Utc::now(), max_age) {
            return Err(format!("older than {}s", ttl.as_secs()));
        }
        if opportunity.buy_venue() == opportunity.sell_venue() {
            return Err("buy and sell venue are the same".to_string());
        }
        if quantity <= Decimal::ZERO {
            return Err(format!("quantity {quantity} is not positive"));
        }
        Ok(())
    }

    async fn run_legs(
        &self,
        opportunity: &Opportunity,
        quantity: Volume,
        paper: bool,
        fee_rate: Decimal,
        profile: &RiskProfile,
        progress: &Mutex<Progress>,
    ) -> Result<(), FailureReason> {
        let pair = opportunity.pair();
        let buy = LegRequest {
            venue: opportunity.buy_venue(),
            pair,
            side: OrderSide::Buy,
            price: opportunity.buy_price(),
            quantity,
        };

        if paper {
            let sell = LegRequest {
                venue: opportunity.sell_venue(),
                pair,
                side: OrderSide::Sell,
                price: opportunity.sell_price(),
                quantity,
            };
            return self.run_paper(&buy, &sell, fee_rate, progress);
        }

        let buy_leg = self.place(&buy, profile).await;
        let buy_error = buy_leg.error.clone();
        let filled = buy_leg.executed_quantity;
        progress.lock().buy = Some(buy_leg);
        if let Some(detail) = buy_error {
            return Err(FailureReason::BuyLegFailed { detail });
        }
        if filled <= Decimal::ZERO {
            return Err(FailureReason::BuyNotFilled);
        }
        if filled < quantity {
            info!(
                opportunity = %opportunity.id(),
                requested = %quantity,
                filled = %filled,
                "Buy partially filled, selling filled quantity"
            );
        }

        let sell = LegRequest {
            venue: opportunity.sell_venue(),
            pair,
            side: OrderSide::Sell,
            price: opportunity.sell_price(),
            quantity: filled,
        };
        let sell_leg = self.place(&sell, profile).await;
        let sell_error = sell_leg.error.clone();
        progress.lock().sell = Some(sell_leg);
        if let Some(detail) = sell_error {
            warn!(
                opportunity = %opportunity.id(),
                venue = %sell.venue,
                error = %detail,
                "Sell leg failed, position left open"
            );
            return Err(FailureReason::SellLegFailed { detail });
        }
        Ok(())
    }

    /// Fill both legs on the paper ledger in one step. Paper fills are
    /// complete, so the sell always matches the buy quantity.
    fn run_paper(
        &self,
        buy: &LegRequest<'_>,
        sell: &LegRequest<'_>,
        fee_rate: Decimal,
        progress: &Mutex<Progress>,
    ) -> Result<(), FailureReason> {
        let (buy_fill, sell_fill) = self
            .ledger
            .simulate_pair(&paper_order(buy, fee_rate), &paper_order(sell, fee_rate))
            .map_err(|e| {
                let detail = e.to_string();
                if matches!(e, LedgerError::InsufficientBalance { .. }) {
                    FailureReason::InsufficientBalance { detail }
                } else {
                    FailureReason::BuyLegFailed { detail }
                }
            })?;

        let mut progress = progress.lock();
        progress.buy = Some(paper_leg(buy, buy_fill));
        progress.sell = Some(paper_leg(sell, sell_fill));
        Ok(())
    }

    /// Place one live market order.
    async fn place(&self, leg: &LegRequest<'_>, profile: &RiskProfile) -> LegResult {
        let client = match self.clients.require(leg.venue) {
            Ok(client) => client,
            Err(e) => return failed_leg(leg, e.to_string()),
        };
        let fill = match client
            .place_market_order(leg.pair, leg.side, leg.quantity)
            .await
        {
            Ok(fill) => fill,
            Err(e) => return failed_leg(leg, e.to_string()),
        };

        let slippage = slippage_of(leg.side, leg.price, fill.average_fill_price);
        let slippage_exceeded = fill.has_fill() && slippage > profile.max_slippage_percentage;
        if slippage_exceeded {
            warn!(
                venue = %leg.venue,
                side = %leg.side,
                expected = %leg.price,
                executed = %fill.average_fill_price,
                slippage_pct = %slippage.round_dp(4),
                limit_pct = %profile.max_slippage_percentage,
                "Slippage exceeded"
            );
        }

        let executed_at = fill.has_fill().then(Utc::now);
        LegResult {
            venue: leg.venue.clone(),
            side: leg.side,
            requested_price: leg.price,
            requested_quantity: leg.quantity,
            executed_price: fill.average_fill_price,
            executed_quantity: fill.filled_quantity,
            fee: fill.fee,
            fee_currency: fill.fee_currency,
            executed_at,
            slippage_exceeded,
            error: None,
        }
    }
}

fn paper_order(leg: &LegRequest<'_>, fee_rate: Decimal) -> PaperOrder {
    PaperOrder {
        venue: leg.venue.clone(),
        pair: leg.pair.clone(),
        side: leg.side,
        price: leg.price,
        quantity: leg.quantity,
        fee_rate,
    }
}

fn paper_leg(leg: &LegRequest<'_>, fill: PaperFill) -> LegResult {
    LegResult {
        venue: fill.venue,
        side: fill.side,
        requested_price: leg.price,
        requested_quantity: leg.quantity,
        executed_price: fill.price,
        executed_quantity: fill.quantity,
        fee: fill.fee,
        fee_currency: fill.fee_currency,
        executed_at: Some(fill.executed_at),
        slippage_exceeded: false,
        error: None,
    }
}

fn failed_leg(leg: &LegRequest<'_>, error: String) -> LegResult {
    LegResult::failed(leg.venue.clone(), leg.side, leg.price, leg.quantity, error)
}

/// Adverse price movement in percent: paying more on a buy, receiving less
/// on a sell. Favourable movement counts as zero.
fn slippage_of(side: OrderSide, expected: Price, executed: Price) -> Percent {
    let adverse = match side {
        OrderSide::Buy => executed - expected,
        OrderSide::Sell => expected - executed,
    };
    percent_of(adverse.max(Decimal::ZERO), expected)
}
