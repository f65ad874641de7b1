//! Decimal arithmetic utilities for risk calculations.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Safe division that returns zero if divisor is zero.
///
/// A quotient beyond the representable range saturates to
/// `Decimal::MAX` / `Decimal::MIN` by sign.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        return Decimal::ZERO;
    }
    numerator.checked_div(denominator).unwrap_or_else(|| {
        if numerator.is_sign_negative() == denominator.is_sign_negative() {
            Decimal::MAX
        } else {
            Decimal::MIN
        }
    })
}

/// Absolute distance between two prices as a fraction of `reference`.
///
/// Returns zero when `reference` is zero.
pub fn pct_distance(price: Decimal, reference: Decimal) -> Decimal {
    safe_div(price.saturating_sub(reference).abs(), reference)
}

/// Apply a percentage (e.g. 15 for 15%) to an amount.
pub fn percent_of(amount: Decimal, pct: Decimal) -> Decimal {
    amount.saturating_mul(pct / dec!(100))
}

/// Express `part` as a percentage of `whole` (0 when `whole` is zero).
pub fn as_percent(part: Decimal, whole: Decimal) -> Decimal {
    safe_div(part, whole).saturating_mul(dec!(100))
}

/// Whether a percentage lies in `(0, 100]`.
pub fn is_valid_pct(pct: Decimal) -> bool {
    pct > Decimal::ZERO && pct <= dec!(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(10), dec!(4)), dec!(2.5));
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_safe_div_saturates_on_overflow() {
        let tiny = dec!(0.0000000000000000000000000001);
        assert_eq!(safe_div(dec!(1000), tiny), Decimal::MAX);
        assert_eq!(safe_div(dec!(-1000), tiny), Decimal::MIN);
        assert_eq!(safe_div(dec!(1000), -tiny), Decimal::MIN);
    }

    #[test]
    fn test_pct_distance() {
        // |43200 - 42800| / 43200 ≈ 0.926%
        let d = pct_distance(dec!(42800), dec!(43200));
        assert!(d > dec!(0.0092) && d < dec!(0.0093));
        assert_eq!(pct_distance(dec!(100), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_percent_helpers() {
        assert_eq!(percent_of(dec!(100000), dec!(15)), dec!(15000));
        assert_eq!(as_percent(dec!(15000), dec!(100000)), dec!(15));
        assert_eq!(as_percent(dec!(1), Decimal::ZERO), Decimal::ZERO);
        assert!(is_valid_pct(dec!(100)));
        assert!(!is_valid_pct(Decimal::ZERO));
        assert!(!is_valid_pct(dec!(100.1)));
    }

    #[test]
    fn test_percent_of_huge_amount_saturates() {
        assert_eq!(percent_of(Decimal::MAX, dec!(150)), Decimal::MAX);
        assert_eq!(as_percent(Decimal::MAX, Decimal::ONE), Decimal::MAX);
    }
}
