//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all application
//! settings, loaded from a TOML file.
//!
//! # Example
//!
//! ```no_run
//! use spreadwatch::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use super::logging::LoggingConfig;
use super::risk::RiskConfig;
use super::venue::VenueConfig;
use crate::domain::{TradingPair, VenueId};
use crate::error::{ConfigError, Result};

/// Detection engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Quotes older than this are never combined into a candidate.
    #[serde(default = "default_quote_staleness_ms")]
    pub quote_staleness_ms: u64,
    /// An unchanged signal is re-emitted at most once per window.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    /// Opportunities older than this are no longer eligible for execution.
    #[serde(default = "default_opportunity_ttl_secs")]
    pub opportunity_ttl_secs: u64,
    /// Capacity of the opportunity broadcast channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_quote_staleness_ms() -> u64 {
    3_000
}

const fn default_dedup_window_ms() -> u64 {
    1_000
}

const fn default_opportunity_ttl_secs() -> u64 {
    300
}

const fn default_channel_capacity() -> usize {
    256
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            quote_staleness_ms: default_quote_staleness_ms(),
            dedup_window_ms: default_dedup_window_ms(),
            opportunity_ttl_secs: default_opportunity_ttl_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Trade execution settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Deadline for both legs together (default: 30 s).
    #[serde(default = "default_execution_timeout_ms")]
    pub timeout_ms: u64,
    /// Execute detected opportunities automatically (default: true).
    #[serde(default = "default_auto_execute")]
    pub auto_execute: bool,
}

const fn default_execution_timeout_ms() -> u64 {
    30_000
}

const fn default_auto_execute() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_execution_timeout_ms(),
            auto_execute: default_auto_execute(),
        }
    }
}

/// Seed balance for the paper ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperBalanceConfig {
    pub venue: VenueId,
    pub currency: String,
    pub amount: Decimal,
}

/// Paper trading settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperConfig {
    /// Simulate fills instead of trading live (default: true).
    #[serde(default = "default_paper_enabled")]
    pub enabled: bool,
    /// Simulated fee as a fraction (default: 0.001 = 0.1 %).
    #[serde(default = "default_paper_fee_rate")]
    pub fee_rate: Decimal,
    #[serde(default)]
    pub balances: Vec<PaperBalanceConfig>,
}

const fn default_paper_enabled() -> bool {
    true
}

fn default_paper_fee_rate() -> Decimal {
    dec!(0.001)
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            enabled: default_paper_enabled(),
            fee_rate: default_paper_fee_rate(),
            balances: Vec::new(),
        }
    }
}

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Risk management limits.
    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Paper trading. Enabled unless explicitly turned off.
    #[serde(default)]
    pub paper: PaperConfig,

    /// Venue definitions.
    #[serde(default)]
    pub venues: Vec<VenueConfig>,

    /// Pairs to watch and the venues enabled for each.
    #[serde(default)]
    pub pairs: BTreeMap<TradingPair, Vec<VenueId>>,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// malformed, or validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        let risk = &self.risk;
        if risk.min_profit_percentage < Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "min_profit_percentage",
                reason: "must be 0 or greater".to_string(),
            }
            .into());
        }
        for (field, value) in [
            (
                "max_capital_per_trade_percentage",
                risk.max_capital_per_trade_percentage,
            ),
            (
                "max_capital_per_asset_percentage",
                risk.max_capital_per_asset_percentage,
            ),
            ("max_slippage_percentage", risk.max_slippage_percentage),
            ("stop_loss_percentage", risk.stop_loss_percentage),
            (
                "daily_loss_limit_percentage",
                risk.daily_loss_limit_percentage,
            ),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be between 0 and 100".to_string(),
                }
                .into());
            }
        }
        if risk.max_concurrent_trades == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_trades",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "compact" | "json") {
            return Err(ConfigError::InvalidValue {
                field: "logging.format",
                reason: format!("unknown format '{}'", self.logging.format),
            }
            .into());
        }

        if self.detection.quote_staleness_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "quote_staleness_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.detection.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "channel_capacity",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.execution.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.paper.fee_rate < Decimal::ZERO || self.paper.fee_rate >= Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "paper.fee_rate",
                reason: "must be in [0, 1)".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for venue in &self.venues {
            if !seen.insert(venue.id.clone()) {
                return Err(ConfigError::InvalidValue {
                    field: "venues",
                    reason: format!("duplicate venue id '{}'", venue.id),
                }
                .into());
            }
            if venue.fee_rate < Decimal::ZERO || venue.fee_rate >= Decimal::ONE {
                return Err(ConfigError::InvalidValue {
                    field: "venues.fee_rate",
                    reason: format!("venue '{}' fee rate must be in [0, 1)", venue.id),
                }
                .into());
            }
        }
        for (pair, venues) in &self.pairs {
            if let Some(unknown) = venues.iter().find(|v| !seen.contains(*v)) {
                return Err(ConfigError::InvalidValue {
                    field: "pairs",
                    reason: format!("pair {pair} references unknown venue '{unknown}'"),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
