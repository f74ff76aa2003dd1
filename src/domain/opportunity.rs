//! Opportunity type with builder pattern.
//!
//! An [`Opportunity`] is a risk-approved cross-venue spread: buy on one venue,
//! sell on another. Everything except its status is fixed at construction;
//! re-detecting the same spread creates a new opportunity.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

use super::ids::{OpportunityId, VenueId};
use super::money::{percent_of, Percent, Price, Volume};
use super::pair::TradingPair;
use crate::error::DomainError;

/// Lifecycle of an opportunity. Transitions only move forward:
/// `Detected -> Executing -> {Executed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Detected,
    Executing,
    Executed,
    Failed,
}

impl OpportunityStatus {
    /// Executed and Failed are terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Failed)
    }

    const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Detected, Self::Executing)
                | (Self::Executing, Self::Executed)
                | (Self::Executing, Self::Failed)
        )
    }
}

impl fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Detected => "detected",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct StatusCell {
    status: OpportunityStatus,
    reason: Option<String>,
}

/// Error returned when building an Opportunity fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpportunityBuildError {
    /// Pair is required but was not provided.
    MissingPair,
    /// Buy venue and price are required but were not provided.
    MissingBuyLeg,
    /// Sell venue and price are required but were not provided.
    MissingSellLeg,
    /// Quantity is required but was not provided.
    MissingQuantity,
    /// Both legs point at the same venue.
    SameVenue,
    /// Quantity or a price is not strictly positive.
    NonPositive,
}

impl fmt::Display for OpportunityBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPair => write!(f, "pair is required"),
            Self::MissingBuyLeg => write!(f, "buy venue and price are required"),
            Self::MissingSellLeg => write!(f, "sell venue and price are required"),
            Self::MissingQuantity => write!(f, "quantity is required"),
            Self::SameVenue => write!(f, "buy and sell venue must differ"),
            Self::NonPositive => write!(f, "prices and quantity must be positive"),
        }
    }
}

impl std::error::Error for OpportunityBuildError {}

/// A detected arbitrage opportunity.
///
/// Use `Opportunity::builder()` to construct instances. The builder derives
/// the spread percentage and estimated profit from the legs.
#[derive(Debug)]
pub struct Opportunity {
    id: OpportunityId,
    pair: TradingPair,
    buy_venue: VenueId,
    buy_price: Price,
    sell_venue: VenueId,
    sell_price: Price,
    quantity: Volume,
    spread_percentage: Percent,
    estimated_profit: Price,
    detected_at: DateTime<Utc>,
    status: RwLock<StatusCell>,
}

impl Opportunity {
    /// Create a new builder for constructing an Opportunity.
    pub fn builder() -> OpportunityBuilder {
        OpportunityBuilder::new()
    }

    pub const fn id(&self) -> OpportunityId {
        self.id
    }

    pub const fn pair(&self) -> &TradingPair {
        &self.pair
    }

    /// Venue where the asset is bought (lowest ask).
    pub const fn buy_venue(&self) -> &VenueId {
        &self.buy_venue
    }

    pub const fn buy_price(&self) -> Price {
        self.buy_price
    }

    /// Venue where the asset is sold (highest bid).
    pub const fn sell_venue(&self) -> &VenueId {
        &self.sell_venue
    }

    pub const fn sell_price(&self) -> Price {
        self.sell_price
    }

    /// Effective (risk-sized) quantity in base currency.
    pub const fn quantity(&self) -> Volume {
        self.quantity
    }

    /// `(sell - buy) / buy * 100`.
    pub const fn spread_percentage(&self) -> Percent {
        self.spread_percentage
    }

    /// `(sell - buy) * quantity`, before fees.
    pub const fn estimated_profit(&self) -> Price {
        self.estimated_profit
    }

    pub const fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Current lifecycle status.
    pub fn status(&self) -> OpportunityStatus {
        self.status.read().status
    }

    /// Reason recorded with the last failure, if any.
    pub fn failure_reason(&self) -> Option<String> {
        self.status.read().reason.clone()
    }

    /// Whether the opportunity is older than `max_age` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.detected_at > max_age
    }

    /// Move to `Executing`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTransition`] unless currently `Detected`.
    pub fn mark_executing(&self) -> Result<(), DomainError> {
        self.transition(OpportunityStatus::Executing, None)
    }

    /// Move to `Executed`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTransition`] unless currently `Executing`.
    pub fn mark_executed(&self) -> Result<(), DomainError> {
        self.transition(OpportunityStatus::Executed, None)
    }

    /// Move to `Failed` with a reason.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTransition`] if already terminal.
    pub fn mark_failed(&self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(OpportunityStatus::Failed, Some(reason.into()))
    }

    fn transition(
        &self,
        next: OpportunityStatus,
        reason: Option<String>,
    ) -> Result<(), DomainError> {
        let mut cell = self.status.write();
        if !cell.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: cell.status,
                to: next,
            });
        }
        cell.status = next;
        cell.reason = reason;
        Ok(())
    }

    /// Serializable point-in-time view for sinks.
    pub fn snapshot(&self) -> OpportunitySnapshot {
        let cell = self.status.read();
        OpportunitySnapshot {
            id: self.id,
            pair: self.pair.clone(),
            buy_venue: self.buy_venue.clone(),
            buy_price: self.buy_price,
            sell_venue: self.sell_venue.clone(),
            sell_price: self.sell_price,
            quantity: self.quantity,
            spread_percentage: self.spread_percentage,
            estimated_profit: self.estimated_profit,
            detected_at: self.detected_at,
            status: cell.status,
            failure_reason: cell.reason.clone(),
        }
    }
}

/// Immutable copy of an [`Opportunity`] including its status at copy time.
#[derive(Debug, Clone, Serialize)]
pub struct OpportunitySnapshot {
    pub id: OpportunityId,
    pub pair: TradingPair,
    pub buy_venue: VenueId,
    pub buy_price: Price,
    pub sell_venue: VenueId,
    pub sell_price: Price,
    pub quantity: Volume,
    pub spread_percentage: Percent,
    pub estimated_profit: Price,
    pub detected_at: DateTime<Utc>,
    pub status: OpportunityStatus,
    pub failure_reason: Option<String>,
}

/// Builder for constructing `Opportunity` instances.
///
/// # Example
///
/// ```ignore
/// let opportunity = Opportunity::builder()
///     .pair(pair)
///     .buy(venue_a, dec!(50000))
///     .sell(venue_b, dec!(50300))
///     .quantity(dec!(0.3))
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct OpportunityBuilder {
    pair: Option<TradingPair>,
    buy: Option<(VenueId, Price)>,
    sell: Option<(VenueId, Price)>,
    quantity: Option<Volume>,
    detected_at: Option<DateTime<Utc>>,
}

impl OpportunityBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pair(mut self, pair: TradingPair) -> Self {
        self.pair = Some(pair);
        self
    }

    /// Set the buy leg (venue with the lowest ask).
    pub fn buy(mut self, venue: VenueId, price: Price) -> Self {
        self.buy = Some((venue, price));
        self
    }

    /// Set the sell leg (venue with the highest bid).
    pub fn sell(mut self, venue: VenueId, price: Price) -> Self {
        self.sell = Some((venue, price));
        self
    }

    pub fn quantity(mut self, quantity: Volume) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Override the detection timestamp (defaults to now).
    pub fn detected_at(mut self, at: DateTime<Utc>) -> Self {
        self.detected_at = Some(at);
        self
    }

    /// Build the Opportunity in `Detected` status.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing, both legs share a
    /// venue, or a price/quantity is not strictly positive.
    pub fn build(self) -> Result<Opportunity, OpportunityBuildError> {
        let pair = self.pair.ok_or(OpportunityBuildError::MissingPair)?;
        let (buy_venue, buy_price) = self.buy.ok_or(OpportunityBuildError::MissingBuyLeg)?;
        let (sell_venue, sell_price) = self.sell.ok_or(OpportunityBuildError::MissingSellLeg)?;
        let quantity = self.quantity.ok_or(OpportunityBuildError::MissingQuantity)?;

        if buy_venue == sell_venue {
            return Err(OpportunityBuildError::SameVenue);
        }
        if buy_price <= Decimal::ZERO || sell_price <= Decimal::ZERO || quantity <= Decimal::ZERO
        {
            return Err(OpportunityBuildError::NonPositive);
        }

        let edge = sell_price - buy_price;

        Ok(Opportunity {
            id: OpportunityId::generate(),
            pair,
            buy_venue,
            buy_price,
            sell_venue,
            sell_price,
            quantity,
            spread_percentage: percent_of(edge, buy_price),
            estimated_profit: edge * quantity,
            detected_at: self.detected_at.unwrap_or_else(Utc::now),
            status: RwLock::new(StatusCell {
                status: OpportunityStatus::Detected,
                reason: None,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Opportunity {
        Opportunity::builder()
            .pair("BTC-USD".parse().unwrap())
            .buy(VenueId::from("a"), dec!(50000))
            .sell(VenueId::from("b"), dec!(50300))
            .quantity(dec!(0.3))
            .build()
            .unwrap()
    }

    #[test]
    fn derived_fields() {
        let opp = sample();
        assert_eq!(opp.spread_percentage(), dec!(0.6));
        assert_eq!(opp.estimated_profit(), dec!(90.0));
        assert_eq!(opp.status(), OpportunityStatus::Detected);
    }

    #[test]
    fn builder_rejects_same_venue() {
        let err = Opportunity::builder()
            .pair("BTC-USD".parse().unwrap())
            .buy(VenueId::from("a"), dec!(1))
            .sell(VenueId::from("a"), dec!(2))
            .quantity(dec!(1))
            .build()
            .unwrap_err();
        assert_eq!(err, OpportunityBuildError::SameVenue);
    }

    #[test]
    fn builder_requires_quantity() {
        let err = Opportunity::builder()
            .pair("BTC-USD".parse().unwrap())
            .buy(VenueId::from("a"), dec!(1))
            .sell(VenueId::from("b"), dec!(2))
            .build()
            .unwrap_err();
        assert_eq!(err, OpportunityBuildError::MissingQuantity);
    }

    #[test]
    fn status_moves_forward_only() {
        let opp = sample();
        opp.mark_executing().unwrap();
        opp.mark_executed().unwrap();

        assert!(opp.mark_failed("late").is_err());
        assert!(opp.mark_executing().is_err());
        assert_eq!(opp.status(), OpportunityStatus::Executed);
    }

    #[test]
    fn detected_cannot_fail_without_executing() {
        let opp = sample();

        assert!(matches!(
            opp.mark_failed("too early"),
            Err(DomainError::InvalidTransition {
                from: OpportunityStatus::Detected,
                to: OpportunityStatus::Failed
            })
        ));
        assert_eq!(opp.status(), OpportunityStatus::Detected);
        assert_eq!(opp.failure_reason(), None);
    }

    #[test]
    fn failure_records_reason() {
        let opp = sample();
        opp.mark_executing().unwrap();
        opp.mark_failed("sell leg rejected").unwrap();

        assert_eq!(opp.status(), OpportunityStatus::Failed);
        assert_eq!(opp.failure_reason().as_deref(), Some("sell leg rejected"));
        assert!(matches!(
            opp.mark_executed(),
            Err(DomainError::InvalidTransition {
                from: OpportunityStatus::Failed,
                to: OpportunityStatus::Executed
            })
        ));
    }

    #[test]
    fn staleness_window() {
        let opp = Opportunity::builder()
            .pair("BTC-USD".parse().unwrap())
            .buy(VenueId::from("a"), dec!(1))
            .sell(VenueId::from("b"), dec!(2))
            .quantity(dec!(1))
            .detected_at(Utc::now() - Duration::minutes(6))
            .build()
            .unwrap();
        assert!(opp.is_stale(Utc::now(), Duration::minutes(5)));
    }
}
