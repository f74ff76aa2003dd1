//! Risk management configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::domain::{RiskProfile, VenueId};

/// Risk management configuration, in percentage points.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_min_profit_percentage")]
    pub min_profit_percentage: Decimal,
    #[serde(default = "default_max_capital_per_trade_percentage")]
    pub max_capital_per_trade_percentage: Decimal,
    #[serde(default = "default_max_capital_per_asset_percentage")]
    pub max_capital_per_asset_percentage: Decimal,
    #[serde(default = "default_max_slippage_percentage")]
    pub max_slippage_percentage: Decimal,
    #[serde(default = "default_stop_loss_percentage")]
    pub stop_loss_percentage: Decimal,
    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: usize,
    /// Minimum spacing between trades in milliseconds (default: 0).
    #[serde(default)]
    pub cooldown_ms: u64,
    #[serde(default = "default_daily_loss_limit_percentage")]
    pub daily_loss_limit_percentage: Decimal,
    #[serde(default)]
    pub trusted_venues: Vec<VenueId>,
    #[serde(default)]
    pub blacklisted_venues: Vec<VenueId>,
}

fn default_min_profit_percentage() -> Decimal {
    dec!(0.1)
}

fn default_max_capital_per_trade_percentage() -> Decimal {
    dec!(10)
}

fn default_max_capital_per_asset_percentage() -> Decimal {
    dec!(25)
}

fn default_max_slippage_percentage() -> Decimal {
    dec!(0.5)
}

fn default_stop_loss_percentage() -> Decimal {
    dec!(2)
}

const fn default_max_concurrent_trades() -> usize {
    3
}

fn default_daily_loss_limit_percentage() -> Decimal {
    dec!(5)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_profit_percentage: default_min_profit_percentage(),
            max_capital_per_trade_percentage: default_max_capital_per_trade_percentage(),
            max_capital_per_asset_percentage: default_max_capital_per_asset_percentage(),
            max_slippage_percentage: default_max_slippage_percentage(),
            stop_loss_percentage: default_stop_loss_percentage(),
            max_concurrent_trades: default_max_concurrent_trades(),
            cooldown_ms: 0,
            daily_loss_limit_percentage: default_daily_loss_limit_percentage(),
            trusted_venues: Vec::new(),
            blacklisted_venues: Vec::new(),
        }
    }
}

impl From<RiskConfig> for RiskProfile {
    fn from(config: RiskConfig) -> Self {
        Self {
            min_profit_percentage: config.min_profit_percentage,
            max_capital_per_trade_percentage: config.max_capital_per_trade_percentage,
            max_capital_per_asset_percentage: config.max_capital_per_asset_percentage,
            max_slippage_percentage: config.max_slippage_percentage,
            stop_loss_percentage: config.stop_loss_percentage,
            max_concurrent_trades: config.max_concurrent_trades,
            cooldown: Duration::from_millis(config.cooldown_ms),
            daily_loss_limit_percentage: config.daily_loss_limit_percentage,
            trusted_venues: config.trusted_venues.into_iter().collect(),
            blacklisted_venues: config.blacklisted_venues.into_iter().collect(),
        }
    }
}
