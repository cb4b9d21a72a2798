//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Whole shares affordable with `notional` at `price`, rounded down.
///
/// Returns `Some(0)` for a non-positive price or notional, and `None` when
/// the share count overflows `Decimal` or does not fit in a `u64`.
pub fn floor_shares(notional: Decimal, price: Decimal) -> Option<u64> {
    if price <= Decimal::ZERO || notional <= Decimal::ZERO {
        return Some(0);
    }
    notional.checked_div(price)?.floor().to_u64()
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Lossy conversion for statistics computed in floating point.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Convert a floating point statistic back, mapping NaN/inf to zero.
pub fn from_f64(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_floor_shares() {
        assert_eq!(floor_shares(dec!(2000), dec!(3)), Some(666));
        assert_eq!(floor_shares(dec!(2000), dec!(4)), Some(500));
        assert_eq!(floor_shares(dec!(2.99), dec!(3)), Some(0));
    }

    #[test]
    fn test_floor_shares_degenerate_inputs() {
        assert_eq!(floor_shares(dec!(1000), Decimal::ZERO), Some(0));
        assert_eq!(floor_shares(dec!(1000), dec!(-1)), Some(0));
        assert_eq!(floor_shares(dec!(-1000), dec!(1)), Some(0));
    }

    #[test]
    fn test_floor_shares_overflow_is_none() {
        // 2e8 / 1e-22 overflows Decimal
        assert_eq!(floor_shares(dec!(200000000), dec!(0.0000000000000000000001)), None);
        // 1e20 shares fits in Decimal but not in u64
        assert_eq!(floor_shares(dec!(100000000000), dec!(0.000000001)), None);
    }

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(10), dec!(4)), dec!(2.5));
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_f64_round_trip_of_nan() {
        assert_eq!(from_f64(f64::NAN), Decimal::ZERO);
        assert_eq!(to_f64(dec!(0.25)), 0.25);
    }
}
