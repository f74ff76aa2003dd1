//! Live, read-only view of configuration polled on every decision.
//!
//! Components never cache these values across decisions; an operator may
//! flip paper trading or tighten the risk profile at runtime through
//! [`SharedConfig`].

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::settings::Config;
use crate::domain::{RiskProfile, TradingPair, VenueId};

/// Detection timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionSettings {
    pub quote_staleness: Duration,
    pub dedup_window: Duration,
    pub opportunity_ttl: Duration,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            quote_staleness: Duration::from_secs(3),
            dedup_window: Duration::from_secs(1),
            opportunity_ttl: Duration::from_secs(300),
        }
    }
}

/// Execution parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub timeout: Duration,
    /// Fee fraction charged on simulated fills.
    pub paper_fee_rate: Decimal,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            paper_fee_rate: Decimal::new(1, 3),
        }
    }
}

/// Source of the settings that may change while the engine runs.
pub trait ConfigSource: Send + Sync {
    fn risk_profile(&self) -> RiskProfile;

    /// Venues enabled for `pair`; empty when the pair is not configured.
    fn enabled_venues(&self, pair: &TradingPair) -> Vec<VenueId>;

    /// Whether execution should be simulated.
    fn paper_trading(&self) -> bool;

    fn detection(&self) -> DetectionSettings;

    fn execution(&self) -> ExecutionSettings;
}

#[derive(Debug, Clone)]
struct RuntimeSettings {
    risk: RiskProfile,
    pairs: BTreeMap<TradingPair, Vec<VenueId>>,
    paper_trading: bool,
    detection: DetectionSettings,
    execution: ExecutionSettings,
}

/// Thread-safe, runtime-updatable [`ConfigSource`].
#[derive(Debug)]
pub struct SharedConfig {
    inner: RwLock<RuntimeSettings>,
}

impl SharedConfig {
    /// Build from a loaded [`Config`].
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            inner: RwLock::new(RuntimeSettings {
                risk: config.risk.clone().into(),
                pairs: config.pairs.clone(),
                paper_trading: config.paper.enabled,
                detection: DetectionSettings {
                    quote_staleness: Duration::from_millis(config.detection.quote_staleness_ms),
                    dedup_window: Duration::from_millis(config.detection.dedup_window_ms),
                    opportunity_ttl: Duration::from_secs(config.detection.opportunity_ttl_secs),
                },
                execution: ExecutionSettings {
                    timeout: Duration::from_millis(config.execution.timeout_ms),
                    paper_fee_rate: config.paper.fee_rate,
                },
            }),
        }
    }

    /// Build directly from a risk profile, paper flag and pair map.
    #[must_use]
    pub fn new(
        risk: RiskProfile,
        pairs: BTreeMap<TradingPair, Vec<VenueId>>,
        paper_trading: bool,
    ) -> Self {
        Self {
            inner: RwLock::new(RuntimeSettings {
                risk,
                pairs,
                paper_trading,
                detection: DetectionSettings::default(),
                execution: ExecutionSettings::default(),
            }),
        }
    }

    pub fn set_paper_trading(&self, enabled: bool) {
        self.inner.write().paper_trading = enabled;
    }

    pub fn set_risk_profile(&self, profile: RiskProfile) {
        self.inner.write().risk = profile;
    }

    pub fn set_enabled_venues(&self, pair: TradingPair, venues: Vec<VenueId>) {
        self.inner.write().pairs.insert(pair, venues);
    }

    pub fn set_detection(&self, detection: DetectionSettings) {
        self.inner.write().detection = detection;
    }

    pub fn set_execution(&self, execution: ExecutionSettings) {
        self.inner.write().execution = execution;
    }

    /// All configured pairs.
    #[must_use]
    pub fn pairs(&self) -> Vec<TradingPair> {
        self.inner.read().pairs.keys().cloned().collect()
    }
}

impl ConfigSource for SharedConfig {
    fn risk_profile(&self) -> RiskProfile {
        self.inner.read().risk.clone()
    }

    fn enabled_venues(&self, pair: &TradingPair) -> Vec<VenueId> {
        self.inner
            .read()
            .pairs
            .get(pair)
            .cloned()
            .unwrap_or_default()
    }

    fn paper_trading(&self) -> bool {
        self.inner.read().paper_trading
    }

    fn detection(&self) -> DetectionSettings {
        self.inner.read().detection
    }

    fn execution(&self) -> ExecutionSettings {
        self.inner.read().execution
    }
}
