//! Per-venue configuration.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::domain::{TradingPair, VenueId};

/// Which client implementation backs a venue.
///
/// Unknown kinds deserialize to [`VenueKind::Unsupported`] so the factory can
/// report them instead of failing config parsing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum VenueKind {
    /// In-process simulated venue.
    Simulated,
    /// A kind this build has no client for.
    Unsupported(String),
}

impl From<String> for VenueKind {
    fn from(kind: String) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "simulated" => Self::Simulated,
            _ => Self::Unsupported(kind),
        }
    }
}

/// One `[[venues]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub id: VenueId,
    pub kind: VenueKind,
    /// Whether the venue pushes order books (default: true).
    #[serde(default = "default_true")]
    pub streaming: bool,
    /// Simulated round-trip latency for order placement.
    #[serde(default)]
    pub latency_ms: u64,
    /// Taker fee as a fraction (default: 0.001 = 0.1 %).
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Interval between generated book updates; `None` disables the generator.
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
    /// Starting mid price per pair for the book generator.
    #[serde(default)]
    pub mid_prices: BTreeMap<TradingPair, Decimal>,
    /// Account balances per currency.
    #[serde(default)]
    pub balances: BTreeMap<String, Decimal>,
}

const fn default_true() -> bool {
    true
}

fn default_fee_rate() -> Decimal {
    dec!(0.001)
}
