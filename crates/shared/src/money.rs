//! Money math
//!
//! Amounts are carried as `i64` minor units (cents) end to end; `Decimal`
//! appears only inside the pure derivations so intermediate division never
//! loses precision. All rounding is banker's rounding to one minor unit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{AppError, AppResult};

/// VAT-inclusive breakdown of a charged total.
///
/// The total is the exact customer-facing amount; subtotal and tax are
/// extracted from it, never added on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VatBreakdown {
    pub total_minor: i64,
    pub subtotal_minor: i64,
    pub tax_minor: i64,
}

/// Round a decimal amount of minor units to a whole minor unit,
/// banker's rounding (ties to even).
pub fn round_minor(amount: Decimal) -> i64 {
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
        .unwrap_or(i64::MAX)
}

/// Extract subtotal and tax from a VAT-inclusive total.
///
/// `subtotal = total / (1 + rate)`, rounded to one minor unit;
/// `tax = total - subtotal` so the three always sum exactly.
pub fn vat_breakdown(total_minor: i64, tax_rate: Decimal) -> AppResult<VatBreakdown> {
    if tax_rate < Decimal::ZERO {
        return Err(AppError::invalid_argument(
            "tax_rate",
            "must not be negative",
        ));
    }
    if total_minor < 0 {
        return Err(AppError::invalid_argument("total", "must not be negative"));
    }

    let total = Decimal::from(total_minor);
    let subtotal_minor = round_minor(total / (Decimal::ONE + tax_rate));
    let tax_minor = total_minor - subtotal_minor;

    Ok(VatBreakdown {
        total_minor,
        subtotal_minor,
        tax_minor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn vat_inclusive_sale_at_sixteen_percent() {
        // Two items: 500.00 x2 and 200.00 x1 -> total 1200.00.
        let total_minor = 2 * 50_000 + 20_000;
        let b = vat_breakdown(total_minor, dec!(0.16)).unwrap();
        assert_eq!(b.total_minor, 120_000);
        assert_eq!(b.subtotal_minor, 103_448); // 1034.48
        assert_eq!(b.tax_minor, 16_552); // 165.52
        assert_eq!(b.subtotal_minor + b.tax_minor, b.total_minor);
    }

    #[test]
    fn zero_rate_means_no_tax() {
        let b = vat_breakdown(12_345, Decimal::ZERO).unwrap();
        assert_eq!(b.subtotal_minor, 12_345);
        assert_eq!(b.tax_minor, 0);
    }

    #[test]
    fn zero_total() {
        let b = vat_breakdown(0, dec!(0.16)).unwrap();
        assert_eq!(b.subtotal_minor, 0);
        assert_eq!(b.tax_minor, 0);
    }

    #[test]
    fn components_always_sum_to_total() {
        for total in [1, 7, 99, 101, 116, 1_000_003] {
            let b = vat_breakdown(total, dec!(0.16)).unwrap();
            assert_eq!(b.subtotal_minor + b.tax_minor, b.total_minor);
            assert!(b.tax_minor >= 0);
        }
    }

    #[test]
    fn bankers_rounding_ties_to_even() {
        assert_eq!(round_minor(dec!(2.5)), 2);
        assert_eq!(round_minor(dec!(3.5)), 4);
        assert_eq!(round_minor(dec!(2.4)), 2);
        assert_eq!(round_minor(dec!(2.6)), 3);
        assert_eq!(round_minor(dec!(-2.5)), -2);
    }

    #[test]
    fn negative_inputs_rejected() {
        assert!(vat_breakdown(-1, dec!(0.16)).is_err());
        assert!(vat_breakdown(100, dec!(-0.1)).is_err());
    }
}
