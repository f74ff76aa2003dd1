//! Trade execution results.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::ids::{OpportunityId, VenueId};
use super::money::{percent_of, Percent, Price, Volume};
use super::pair::TradingPair;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}

/// Outcome of one leg (buy or sell) of an arbitrage trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegResult {
    pub venue: VenueId,
    pub side: OrderSide,
    pub requested_price: Price,
    pub requested_quantity: Volume,
    pub executed_price: Price,
    pub executed_quantity: Volume,
    pub fee: Decimal,
    pub fee_currency: String,
    pub executed_at: Option<DateTime<Utc>>,
    /// Executed price moved against us by more than the slippage limit.
    pub slippage_exceeded: bool,
    pub error: Option<String>,
}

impl LegResult {
    /// A leg that was attempted but produced no fill.
    #[must_use]
    pub fn failed(
        venue: VenueId,
        side: OrderSide,
        requested_price: Price,
        requested_quantity: Volume,
        error: impl Into<String>,
    ) -> Self {
        Self {
            venue,
            side,
            requested_price,
            requested_quantity,
            executed_price: Decimal::ZERO,
            executed_quantity: Decimal::ZERO,
            fee: Decimal::ZERO,
            fee_currency: String::new(),
            executed_at: None,
            slippage_exceeded: false,
            error: Some(error.into()),
        }
    }

    /// Notional value of the executed portion, before fees.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.executed_price * self.executed_quantity
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.error.is_none() && self.executed_quantity > Decimal::ZERO
    }
}

/// Why a trade did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Opportunity was not eligible (stale, wrong status, ...).
    Ineligible { detail: String },
    /// No concurrent-trade slot was available.
    ConcurrencyLimit,
    /// Simulated balance could not cover a leg.
    InsufficientBalance { detail: String },
    /// Buy order errored.
    BuyLegFailed { detail: String },
    /// Buy order was accepted but filled nothing.
    BuyNotFilled,
    /// Sell order errored after the buy filled. The position is left open.
    SellLegFailed { detail: String },
    /// The overall deadline elapsed.
    Timeout { after_ms: u64 },
}

impl FailureReason {
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ineligible { detail } => write!(f, "ineligible: {detail}"),
            Self::ConcurrencyLimit => write!(f, "concurrency limit reached"),
            Self::InsufficientBalance { detail } => write!(f, "insufficient balance: {detail}"),
            Self::BuyLegFailed { detail } => write!(f, "buy leg failed: {detail}"),
            Self::BuyNotFilled => write!(f, "buy leg filled zero quantity"),
            Self::SellLegFailed { detail } => write!(f, "sell leg failed: {detail}"),
            Self::Timeout { after_ms } => write!(f, "timed out after {after_ms}ms"),
        }
    }
}

/// Final outcome of an execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TradeOutcome {
    Executed,
    Failed { reason: FailureReason },
}

/// Result of executing both legs of an opportunity.
#[derive(Debug, Clone, Serialize)]
pub struct TradeResult {
    pub opportunity_id: OpportunityId,
    pub pair: TradingPair,
    pub paper: bool,
    pub buy: Option<LegResult>,
    pub sell: Option<LegResult>,
    /// `sell_total - buy_total - buy_fee - sell_fee`; only set when both legs filled.
    pub profit: Option<Decimal>,
    pub profit_percentage: Option<Percent>,
    pub outcome: TradeOutcome,
    pub completed_at: DateTime<Utc>,
}

impl TradeResult {
    /// Both legs filled.
    #[must_use]
    pub fn executed(
        opportunity_id: OpportunityId,
        pair: TradingPair,
        paper: bool,
        buy: LegResult,
        sell: LegResult,
    ) -> Self {
        let buy_total = buy.notional();
        let profit = sell.notional() - buy_total - buy.fee - sell.fee;
        Self {
            opportunity_id,
            pair,
            paper,
            buy: Some(buy),
            sell: Some(sell),
            profit: Some(profit),
            profit_percentage: Some(percent_of(profit, buy_total)),
            outcome: TradeOutcome::Executed,
            completed_at: Utc::now(),
        }
    }

    /// Execution stopped with `reason`; whichever legs ran are recorded.
    #[must_use]
    pub fn failed(
        opportunity_id: OpportunityId,
        pair: TradingPair,
        paper: bool,
        buy: Option<LegResult>,
        sell: Option<LegResult>,
        reason: FailureReason,
    ) -> Self {
        Self {
            opportunity_id,
            pair,
            paper,
            buy,
            sell,
            profit: None,
            profit_percentage: None,
            outcome: TradeOutcome::Failed { reason },
            completed_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn is_executed(&self) -> bool {
        matches!(self.outcome, TradeOutcome::Executed)
    }

    #[must_use]
    pub const fn failure_reason(&self) -> Option<&FailureReason> {
        match &self.outcome {
            TradeOutcome::Executed => None,
            TradeOutcome::Failed { reason } => Some(reason),
        }
    }

    /// Realised P&L for risk accounting: zero unless both legs filled.
    #[must_use]
    pub fn realized_pnl(&self) -> Decimal {
        self.profit.unwrap_or(Decimal::ZERO)
    }
}
