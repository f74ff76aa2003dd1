//! Trading pair value type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A base/quote currency pair such as `BTC-USD`.
///
/// Both components are uppercase-normalized; equality is by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingPair {
    base: String,
    quote: String,
}

impl TradingPair {
    /// Create a pair from its two currency codes.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidPair`] if either code is empty or
    /// contains non-alphanumeric characters, or if both codes are equal.
    pub fn new(base: &str, quote: &str) -> Result<Self, DomainError> {
        let base = normalize(base);
        let quote = normalize(quote);
        let input = format!("{base}-{quote}");

        if base.is_empty() || quote.is_empty() {
            return Err(DomainError::InvalidPair {
                input,
                reason: "currency code is empty",
            });
        }
        if !is_code(&base) || !is_code(&quote) {
            return Err(DomainError::InvalidPair {
                input,
                reason: "currency code must be alphanumeric",
            });
        }
        if base == quote {
            return Err(DomainError::InvalidPair {
                input,
                reason: "base and quote must differ",
            });
        }
        Ok(Self { base, quote })
    }

    /// Base currency (the asset being bought or sold).
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote currency (the asset prices are expressed in).
    #[must_use]
    pub fn quote(&self) -> &str {
        &self.quote
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn is_code(code: &str) -> bool {
    code.chars().all(|c| c.is_ascii_alphanumeric())
}

impl FromStr for TradingPair {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ['-', '/', '_']);
        match (parts.next(), parts.next()) {
            (Some(base), Some(quote)) => Self::new(base, quote),
            _ => Err(DomainError::InvalidPair {
                input: s.to_string(),
                reason: "expected BASE-QUOTE",
            }),
        }
    }
}

impl TryFrom<String> for TradingPair {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TradingPair> for String {
    fn from(pair: TradingPair) -> Self {
        pair.to_string()
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}
