//! Subscription pricing
//!
//! Pure functions only; no datastore or gateway access. The monthly base
//! price is tenant-platform configuration (minor currency units), cycles
//! multiply it, and every location beyond the main one is charged at 80%
//! of the cycle base.

use dukapo_shared::{round_minor, AppError, AppResult, BillingCycle};
use rust_decimal::Decimal;

/// Volume rate for each additional branch beyond the main location: 0.8.
fn additional_rate() -> Decimal {
    Decimal::new(8, 1)
}

/// Full-cycle price for the main location.
pub fn cycle_base_minor(monthly_base_minor: i64, cycle: BillingCycle) -> i64 {
    monthly_base_minor * cycle.base_multiplier()
}

/// Full-cycle price for one additional branch (80% of the cycle base).
pub fn per_branch_price_minor(monthly_base_minor: i64, cycle: BillingCycle) -> i64 {
    round_minor(Decimal::from(cycle_base_minor(monthly_base_minor, cycle)) * additional_rate())
}

/// Total for a cycle covering `location_count` locations (main included).
pub fn cycle_total_minor(
    monthly_base_minor: i64,
    cycle: BillingCycle,
    location_count: usize,
) -> AppResult<i64> {
    if location_count == 0 {
        return Err(AppError::invalid_argument(
            "branches",
            "at least the main location must be selected",
        ));
    }
    let base = cycle_base_minor(monthly_base_minor, cycle);
    let extra = per_branch_price_minor(monthly_base_minor, cycle);
    Ok(base + (location_count as i64 - 1) * extra)
}

/// Pro-rata charge for a branch added with `remaining_days` left of a
/// `period_days`-day cycle.
pub fn prorata_minor(
    per_branch_minor: i64,
    remaining_days: i64,
    period_days: i64,
) -> AppResult<i64> {
    if period_days <= 0 {
        return Err(AppError::invalid_argument(
            "period_days",
            "must be positive",
        ));
    }
    if remaining_days < 0 || remaining_days > period_days {
        return Err(AppError::invalid_argument(
            "remaining_days",
            "must lie within the billing period",
        ));
    }
    Ok(round_minor(
        Decimal::from(per_branch_minor) * Decimal::from(remaining_days)
            / Decimal::from(period_days),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: i64 = 2000;

    #[test]
    fn cycle_multipliers() {
        assert_eq!(cycle_base_minor(BASE, BillingCycle::Monthly), 2000);
        assert_eq!(cycle_base_minor(BASE, BillingCycle::SemiAnnual), 10_000);
        assert_eq!(cycle_base_minor(BASE, BillingCycle::Annual), 20_000);
    }

    #[test]
    fn additional_branch_is_eighty_percent() {
        assert_eq!(per_branch_price_minor(BASE, BillingCycle::Monthly), 1600);
        assert_eq!(per_branch_price_minor(BASE, BillingCycle::Annual), 16_000);
    }

    #[test]
    fn totals_scale_with_branch_count() {
        assert_eq!(cycle_total_minor(BASE, BillingCycle::Monthly, 1).unwrap(), 2000);
        assert_eq!(cycle_total_minor(BASE, BillingCycle::Monthly, 2).unwrap(), 3600);
        assert_eq!(cycle_total_minor(BASE, BillingCycle::Monthly, 4).unwrap(), 6800);
        assert_eq!(
            cycle_total_minor(BASE, BillingCycle::SemiAnnual, 3).unwrap(),
            26_000
        );
    }

    #[test]
    fn empty_selection_rejected() {
        assert!(cycle_total_minor(BASE, BillingCycle::Monthly, 0).is_err());
    }

    #[test]
    fn prorata_twenty_of_thirty_days() {
        // 1600 * 20 / 30 = 1066.67 -> 1067
        let per_branch = per_branch_price_minor(BASE, BillingCycle::Monthly);
        assert_eq!(prorata_minor(per_branch, 20, 30).unwrap(), 1067);
    }

    #[test]
    fn prorata_full_and_zero_remainder() {
        assert_eq!(prorata_minor(1600, 30, 30).unwrap(), 1600);
        assert_eq!(prorata_minor(1600, 0, 30).unwrap(), 0);
    }

    #[test]
    fn prorata_bounds_checked() {
        assert!(prorata_minor(1600, 31, 30).is_err());
        assert!(prorata_minor(1600, -1, 30).is_err());
        assert!(prorata_minor(1600, 1, 0).is_err());
    }
}
