//! Installment sale ledger tests
//!
//! Tests for project sales and payments including:
//! - Installment plan reconciliation
//! - Status derivation from payments
//! - Payment ceiling at the sale total
//! - Schedule dates

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    ensure_within_total, payment_progress, remaining_balance, InstallmentPlan, RuleViolation,
    SaleStatus,
};
use std::str::FromStr;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn plan(total: &str, down: &str, count: i32, amount: &str) -> InstallmentPlan {
    InstallmentPlan {
        sale_total: dec(total),
        down_payment: dec(down),
        number_of_installments: count,
        installment_amount: dec(amount),
    }
}

/// Apply payments in order the way the ledger does, stopping at the first rejection
fn pay_all(sale_total: Decimal, payments: &[Decimal]) -> (Decimal, SaleStatus) {
    let mut total_paid = Decimal::ZERO;
    for amount in payments {
        if let Ok(new_total) = ensure_within_total(total_paid, *amount, sale_total) {
            total_paid = new_total;
        }
    }
    (total_paid, SaleStatus::derive(total_paid, sale_total))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// 1200 total, 200 down, 5 x 200 reconciles
    #[test]
    fn test_plan_accepted() {
        assert!(plan("1200", "200", 5, "200").validate().is_ok());
    }

    /// 5 x 150 falls short of the 1000 remaining
    #[test]
    fn test_plan_rejected() {
        let err = plan("1200", "200", 5, "150").validate().unwrap_err();
        assert!(matches!(err, RuleViolation::Input { ref field, .. } if field == "installment_amount"));
    }

    /// A cent of rounding is tolerated, two cents are not
    #[test]
    fn test_plan_tolerance() {
        assert!(plan("1000", "0", 3, "333.33").validate().is_ok());
        assert!(plan("1000", "0", 3, "333.32").validate().is_err());
    }

    /// Full payment up front must carry the total on its single line
    #[test]
    fn test_plan_paid_upfront() {
        assert!(plan("500", "500", 1, "500").validate().is_ok());
        assert!(plan("500", "500", 1, "0").validate().is_err());
    }

    /// Down payment above the total is rejected
    #[test]
    fn test_plan_down_payment_too_large() {
        assert!(plan("500", "600", 1, "0").validate().is_err());
    }

    /// 1000 total: 200 down is partial, 800 more is full, deleting it is partial again
    #[test]
    fn test_status_follows_payments() {
        let total = dec("1000");
        let after_down = ensure_within_total(Decimal::ZERO, dec("200"), total).unwrap();
        assert_eq!(SaleStatus::derive(after_down, total), SaleStatus::PartiallyPaid);

        let after_rest = ensure_within_total(after_down, dec("800"), total).unwrap();
        assert_eq!(SaleStatus::derive(after_rest, total), SaleStatus::FullyPaid);

        let after_delete = after_rest - dec("800");
        assert_eq!(SaleStatus::derive(after_delete, total), SaleStatus::PartiallyPaid);
        assert_eq!(SaleStatus::derive(Decimal::ZERO, total), SaleStatus::Unpaid);
    }

    /// Overpaying names the largest amount still accepted
    #[test]
    fn test_overpayment_message() {
        let err = ensure_within_total(dec("900"), dec("150"), dec("1000")).unwrap_err();
        assert_eq!(
            err,
            RuleViolation::input("amount", "payment exceeds remaining balance. Maximum allowed: 100")
        );
    }

    /// Modifying a payment counts only the other payments
    #[test]
    fn test_modify_excludes_own_amount() {
        // Payments 200 and 300 on a 500 sale; raising the 300 to 300 again is fine,
        // raising it to 301 is not
        let others = dec("200");
        assert!(ensure_within_total(others, dec("300"), dec("500")).is_ok());
        assert!(ensure_within_total(others, dec("301"), dec("500")).is_err());
    }

    /// Next installment falls due one month per installment after the sale
    #[test]
    fn test_schedule_dates() {
        let sale_date = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let terms = plan("1200", "200", 5, "200");

        assert_eq!(terms.installments_paid(dec("200")), 0);
        assert_eq!(
            terms.next_due_date(sale_date, dec("200")),
            Some(Utc.with_ymd_and_hms(2024, 2, 15, 9, 0, 0).unwrap())
        );

        assert_eq!(terms.installments_paid(dec("650")), 2);
        assert_eq!(
            terms.next_due_date(sale_date, dec("650")),
            Some(Utc.with_ymd_and_hms(2024, 4, 15, 9, 0, 0).unwrap())
        );

        assert_eq!(terms.next_due_date(sale_date, dec("1200")), None);
        assert_eq!(
            terms.expected_completion_date(sale_date),
            Some(Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap())
        );
    }

    /// Progress and balance figures
    #[test]
    fn test_progress_and_balance() {
        assert_eq!(payment_progress(dec("200"), dec("1200")), dec("16.67"));
        assert_eq!(payment_progress(dec("0"), dec("0")), Decimal::ZERO);
        assert_eq!(remaining_balance(dec("200"), dec("1200")), dec("1000"));
        assert_eq!(remaining_balance(dec("1200"), dec("1200")), Decimal::ZERO);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for generating money amounts (0.01 to 5000.00)
    fn amount_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=500000i64).prop_map(|n| Decimal::new(n, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The sum of accepted payments never exceeds the sale total
        #[test]
        fn prop_payments_never_exceed_total(
            total in amount_strategy(),
            payments in prop::collection::vec(amount_strategy(), 0..20)
        ) {
            let (total_paid, _) = pay_all(total, &payments);
            prop_assert!(total_paid <= total);
        }

        /// Status always agrees with the amount paid
        #[test]
        fn prop_status_matches_total(
            total in amount_strategy(),
            payments in prop::collection::vec(amount_strategy(), 0..20)
        ) {
            let (total_paid, status) = pay_all(total, &payments);
            let expected = if total_paid == total {
                SaleStatus::FullyPaid
            } else if total_paid > Decimal::ZERO {
                SaleStatus::PartiallyPaid
            } else {
                SaleStatus::Unpaid
            };
            prop_assert_eq!(status, expected);
        }

        /// Plans built from exact installments always validate
        #[test]
        fn prop_exact_plans_validate(
            installment in amount_strategy(),
            count in 1i32..=60,
            down in amount_strategy(),
        ) {
            let total = installment * Decimal::from(count) + down;
            let terms = InstallmentPlan {
                sale_total: total,
                down_payment: down,
                number_of_installments: count,
                installment_amount: installment,
            };
            prop_assert!(terms.validate().is_ok());
        }

        /// Installments paid never exceed the plan
        #[test]
        fn prop_installments_paid_bounded(
            installment in amount_strategy(),
            count in 1i32..=60,
            paid_fraction in 0u32..=100,
        ) {
            let total = installment * Decimal::from(count);
            let terms = InstallmentPlan {
                sale_total: total,
                down_payment: Decimal::ZERO,
                number_of_installments: count,
                installment_amount: installment,
            };
            let paid = total * Decimal::from(paid_fraction) / Decimal::ONE_HUNDRED;
            let count_paid = terms.installments_paid(paid);
            prop_assert!((0..=count).contains(&count_paid));
        }
    }
}
