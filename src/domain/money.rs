//! Monetary types for price and volume representation.

use rust_decimal::Decimal;

/// Price represented as a Decimal for precision.
pub type Price = Decimal;

/// Volume represented as a Decimal for precision.
pub type Volume = Decimal;

/// Percentage points, e.g. `0.6` means 0.6 %.
pub type Percent = Decimal;

/// Percentage change from `base` to `value`, in percentage points.
///
/// Returns zero when `base` is zero.
#[must_use]
pub fn percent_of(value: Decimal, base: Decimal) -> Percent {
    if base.is_zero() {
        return Decimal::ZERO;
    }
    value / base * Decimal::ONE_HUNDRED
}
