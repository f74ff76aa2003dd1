//! Risk policy engine.
//!
//! [`RiskEngine::evaluate`] is a pure function of a candidate, a profile and
//! a [`RiskContext`]. A `RiskEngine` instance additionally owns the shared
//! counters the context is built from: open trades, last trade time and the
//! day's realised P&L. Separate instances never share state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{percent_of, Percent, Price, RiskProfile, TradingPair, VenueId, Volume};

/// A potential trade before risk sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeCandidate {
    pub pair: TradingPair,
    pub buy_venue: VenueId,
    pub buy_price: Price,
    pub sell_venue: VenueId,
    pub sell_price: Price,
    /// Quantity available at both top-of-book levels.
    pub quantity: Volume,
}

impl TradeCandidate {
    /// `(sell - buy) / buy * 100`.
    #[must_use]
    pub fn spread_percentage(&self) -> Percent {
        percent_of(self.sell_price - self.buy_price, self.buy_price)
    }
}

/// Point-in-time inputs to a risk decision.
#[derive(Debug, Clone, Copy)]
pub struct RiskContext {
    /// Quote-currency capital available on the buy venue.
    pub available_capital: Decimal,
    pub open_trades: usize,
    pub since_last_trade: Option<Duration>,
    /// Realised P&L so far today; negative is a loss.
    pub daily_pnl: Decimal,
}

impl RiskContext {
    /// A context with nothing traded yet.
    #[must_use]
    pub const fn fresh(available_capital: Decimal) -> Self {
        Self {
            available_capital,
            open_trades: 0,
            since_last_trade: None,
            daily_pnl: Decimal::ZERO,
        }
    }
}

/// Why a candidate was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskRejection {
    #[error("profit {spread}% does not exceed minimum {min}%")]
    BelowMinProfit { spread: Percent, min: Percent },

    #[error("venue {venue} is blacklisted")]
    Blacklisted { venue: VenueId },

    #[error("venue {venue} is not trusted")]
    Untrusted { venue: VenueId },

    #[error("position size is zero after capital limit ({capital} available)")]
    ZeroQuantity { capital: Decimal },

    #[error("concurrent trade limit reached: {open}/{max}")]
    ConcurrencyLimit { open: usize, max: usize },

    #[error("cooldown active: {remaining_ms}ms remaining")]
    Cooldown { remaining_ms: u64 },

    #[error("daily loss {loss} reached limit {limit}")]
    DailyLossLimit { loss: Decimal, limit: Decimal },
}

/// Outcome of a risk evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    /// Trade `quantity`, possibly smaller than requested.
    Accept { quantity: Volume },
    Reject(RiskRejection),
}

impl RiskDecision {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }

    #[must_use]
    pub const fn rejection(&self) -> Option<&RiskRejection> {
        match self {
            Self::Accept { .. } => None,
            Self::Reject(r) => Some(r),
        }
    }
}

/// Risk engine and its shared counters.
pub struct RiskEngine {
    open_trades: AtomicUsize,
    last_trade: Mutex<Option<Instant>>,
    daily_pnl: Mutex<(NaiveDate, Decimal)>,
}

impl RiskEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            open_trades: AtomicUsize::new(0),
            last_trade: Mutex::new(None),
            daily_pnl: Mutex::new((Utc::now().date_naive(), Decimal::ZERO)),
        }
    }

    /// Apply the rules in order; the first violation wins.
    #[must_use]
    pub fn evaluate(
        candidate: &TradeCandidate,
        profile: &RiskProfile,
        context: &RiskContext,
    ) -> RiskDecision {
        let spread = candidate.spread_percentage();
        if spread <= profile.min_profit_percentage {
            return RiskDecision::Reject(RiskRejection::BelowMinProfit {
                spread,
                min: profile.min_profit_percentage,
            });
        }

        for venue in [&candidate.buy_venue, &candidate.sell_venue] {
            if profile.blacklisted_venues.contains(venue) {
                return RiskDecision::Reject(RiskRejection::Blacklisted {
                    venue: venue.clone(),
                });
            }
            if !profile.venue_allowed(venue) {
                return RiskDecision::Reject(RiskRejection::Untrusted {
                    venue: venue.clone(),
                });
            }
        }

        let max_quantity = if candidate.buy_price > Decimal::ZERO {
            profile.max_trade_notional(context.available_capital) / candidate.buy_price
        } else {
            Decimal::ZERO
        };
        let quantity = candidate.quantity.min(max_quantity);
        if quantity <= Decimal::ZERO {
            return RiskDecision::Reject(RiskRejection::ZeroQuantity {
                capital: context.available_capital,
            });
        }

        if context.open_trades >= profile.max_concurrent_trades {
            return RiskDecision::Reject(RiskRejection::ConcurrencyLimit {
                open: context.open_trades,
                max: profile.max_concurrent_trades,
            });
        }

        if let Some(elapsed) = context.since_last_trade {
            if elapsed < profile.cooldown {
                let remaining = profile.cooldown - elapsed;
                return RiskDecision::Reject(RiskRejection::Cooldown {
                    remaining_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        let loss = -context.daily_pnl;
        let limit =
            context.available_capital * profile.daily_loss_limit_percentage / Decimal::ONE_HUNDRED;
        if loss > Decimal::ZERO && loss >= limit {
            return RiskDecision::Reject(RiskRejection::DailyLossLimit { loss, limit });
        }

        RiskDecision::Accept { quantity }
    }

    /// Evaluate against this engine's current counters.
    #[must_use]
    pub fn check(
        &self,
        candidate: &TradeCandidate,
        profile: &RiskProfile,
        available_capital: Decimal,
    ) -> RiskDecision {
        let decision = Self::evaluate(candidate, profile, &self.context(available_capital));
        if let RiskDecision::Reject(reason) = &decision {
            debug!(
                pair = %candidate.pair,
                buy_venue = %candidate.buy_venue,
                sell_venue = %candidate.sell_venue,
                reason = %reason,
                "Risk rejected candidate"
            );
        }
        decision
    }

    /// Snapshot of the counters as a [`RiskContext`].
    #[must_use]
    pub fn context(&self, available_capital: Decimal) -> RiskContext {
        RiskContext {
            available_capital,
            open_trades: self.open_trades(),
            since_last_trade: self.last_trade.lock().map(|at| at.elapsed()),
            daily_pnl: self.daily_pnl(),
        }
    }

    /// Atomically take a trade slot if fewer than `max` are open.
    #[must_use]
    pub fn try_begin_trade(&self, max: usize) -> bool {
        self.open_trades
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| {
                (open < max).then_some(open + 1)
            })
            .is_ok()
    }

    /// Release a slot taken by [`try_begin_trade`](Self::try_begin_trade)
    /// and record the trade's realised P&L.
    pub fn finish_trade(&self, pnl: Decimal) {
        self.release_slot();
        *self.last_trade.lock() = Some(Instant::now());

        let today = Utc::now().date_naive();
        let mut daily = self.daily_pnl.lock();
        if daily.0 != today {
            *daily = (today, Decimal::ZERO);
        }
        daily.1 += pnl;
    }

    fn release_slot(&self) {
        let released = self
            .open_trades
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| open.checked_sub(1));
        if released.is_err() {
            warn!("Released a trade slot with none open");
        }
    }

    #[must_use]
    pub fn open_trades(&self) -> usize {
        self.open_trades.load(Ordering::SeqCst)
    }

    /// Realised P&L for the current UTC day.
    #[must_use]
    pub fn daily_pnl(&self) -> Decimal {
        let daily = self.daily_pnl.lock();
        if daily.0 == Utc::now().date_naive() {
            daily.1
        } else {
            Decimal::ZERO
        }
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candidate(buy: Decimal, sell: Decimal, quantity: Decimal) -> TradeCandidate {
        TradeCandidate {
            pair: "BTC-USD".parse().unwrap(),
            buy_venue: VenueId::from("a"),
            buy_price: buy,
            sell_venue: VenueId::from("b"),
            sell_price: sell,
            quantity,
        }
    }

    fn profile() -> RiskProfile {
        RiskProfile {
            max_capital_per_trade_percentage: dec!(100),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_profitable_candidate() {
        let decision = RiskEngine::evaluate(
            &candidate(dec!(50000), dec!(50300), dec!(0.3)),
            &profile(),
            &RiskContext::fresh(dec!(1000000)),
        );
        assert_eq!(decision, RiskDecision::Accept { quantity: dec!(0.3) });
    }

    #[test]
    fn spread_at_minimum_is_rejected() {
        let profile = RiskProfile {
            min_profit_percentage: dec!(0.6),
            ..profile()
        };
        let decision = RiskEngine::evaluate(
            &candidate(dec!(50000), dec!(50300), dec!(0.3)),
            &profile,
            &RiskContext::fresh(dec!(1000000)),
        );
        assert!(matches!(
            decision.rejection(),
            Some(RiskRejection::BelowMinProfit { .. })
        ));
    }

    #[test]
    fn blacklisted_and_untrusted_venues() {
        let mut profile = profile();
        profile.blacklisted_venues.insert(VenueId::from("b"));
        let c = candidate(dec!(100), dec!(110), dec!(1));
        let ctx = RiskContext::fresh(dec!(1000));

        assert_eq!(
            RiskEngine::evaluate(&c, &profile, &ctx).rejection(),
            Some(&RiskRejection::Blacklisted {
                venue: VenueId::from("b")
            })
        );

        profile.blacklisted_venues.clear();
        profile.trusted_venues.insert(VenueId::from("b"));
        assert_eq!(
            RiskEngine::evaluate(&c, &profile, &ctx).rejection(),
            Some(&RiskRejection::Untrusted {
                venue: VenueId::from("a")
            })
        );
    }

    #[test]
    fn quantity_is_capped_by_capital() {
        let profile = RiskProfile {
            max_capital_per_trade_percentage: dec!(10),
            ..Default::default()
        };
        // 10% of 100000 = 10000 notional, / 50000 = 0.2
        let decision = RiskEngine::evaluate(
            &candidate(dec!(50000), dec!(50300), dec!(0.3)),
            &profile,
            &RiskContext::fresh(dec!(100000)),
        );
        assert_eq!(decision, RiskDecision::Accept { quantity: dec!(0.2) });
    }

    #[test]
    fn zero_capital_rejects() {
        let decision = RiskEngine::evaluate(
            &candidate(dec!(100), dec!(110), dec!(1)),
            &profile(),
            &RiskContext::fresh(Decimal::ZERO),
        );
        assert!(matches!(
            decision.rejection(),
            Some(RiskRejection::ZeroQuantity { .. })
        ));
    }

    #[test]
    fn cooldown_rejects_recent_trade() {
        let profile = RiskProfile {
            cooldown: Duration::from_secs(10),
            ..profile()
        };
        let ctx = RiskContext {
            since_last_trade: Some(Duration::from_secs(4)),
            ..RiskContext::fresh(dec!(1000))
        };
        assert_eq!(
            RiskEngine::evaluate(&candidate(dec!(100), dec!(110), dec!(1)), &profile, &ctx)
                .rejection(),
            Some(&RiskRejection::Cooldown { remaining_ms: 6000 })
        );
    }

    #[test]
    fn daily_loss_limit_halts_trading() {
        let ctx = RiskContext {
            daily_pnl: dec!(-60),
            ..RiskContext::fresh(dec!(1000))
        };
        // 5% of 1000 = 50
        assert_eq!(
            RiskEngine::evaluate(&candidate(dec!(100), dec!(110), dec!(1)), &profile(), &ctx)
                .rejection(),
            Some(&RiskRejection::DailyLossLimit {
                loss: dec!(60),
                limit: dec!(50)
            })
        );
    }

    #[test]
    fn slots_are_bounded_and_released() {
        let engine = RiskEngine::new();
        assert!(engine.try_begin_trade(2));
        assert!(engine.try_begin_trade(2));
        assert!(!engine.try_begin_trade(2));

        engine.finish_trade(dec!(-5));
        assert_eq!(engine.open_trades(), 1);
        assert_eq!(engine.daily_pnl(), dec!(-5));
        assert!(engine.context(dec!(1)).since_last_trade.is_some());
    }

    #[test]
    fn instances_do_not_share_state() {
        let a = RiskEngine::new();
        let b = RiskEngine::new();
        assert!(a.try_begin_trade(1));
        assert!(b.try_begin_trade(1));
    }
}
