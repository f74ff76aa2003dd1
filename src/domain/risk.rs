//! Risk profile: the configuration bundle read by the risk engine.

use std::collections::HashSet;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::ids::VenueId;
use super::money::Percent;

/// Risk limits applied to every candidate trade.
///
/// All percentages are in percentage points (`0.5` means 0.5 %).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskProfile {
    /// Spread must strictly exceed this to be traded.
    pub min_profit_percentage: Percent,
    /// Share of available capital a single trade may commit.
    pub max_capital_per_trade_percentage: Percent,
    /// Share of available capital that may sit in one asset.
    pub max_capital_per_asset_percentage: Percent,
    /// Tolerated deviation between quoted and executed price.
    pub max_slippage_percentage: Percent,
    pub stop_loss_percentage: Percent,
    pub max_concurrent_trades: usize,
    /// Minimum spacing between two trades.
    pub cooldown: Duration,
    /// Realised loss for the day, as a share of capital, that halts trading.
    pub daily_loss_limit_percentage: Percent,
    /// When non-empty, only these venues may be traded.
    pub trusted_venues: HashSet<VenueId>,
    pub blacklisted_venues: HashSet<VenueId>,
}

impl RiskProfile {
    /// Whether `venue` may be traded under the trust lists.
    #[must_use]
    pub fn venue_allowed(&self, venue: &VenueId) -> bool {
        !self.blacklisted_venues.contains(venue)
            && (self.trusted_venues.is_empty() || self.trusted_venues.contains(venue))
    }
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            min_profit_percentage: dec!(0.1),
            max_capital_per_trade_percentage: dec!(10),
            max_capital_per_asset_percentage: dec!(25),
            max_slippage_percentage: dec!(0.5),
            stop_loss_percentage: dec!(2),
            max_concurrent_trades: 3,
            cooldown: Duration::ZERO,
            daily_loss_limit_percentage: dec!(5),
            trusted_venues: HashSet::new(),
            blacklisted_venues: HashSet::new(),
        }
    }
}

impl RiskProfile {
    /// Maximum quote-currency notional one trade may use out of `capital`.
    #[must_use]
    pub fn max_trade_notional(&self, capital: Decimal) -> Decimal {
        capital * self.max_capital_per_trade_percentage / Decimal::ONE_HUNDRED
    }
}
