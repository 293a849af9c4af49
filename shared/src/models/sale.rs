//! Project sale and installment payment models

use std::fmt;

use chrono::{DateTime, Months, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RuleViolation;

/// Slack allowed when reconciling an installment schedule (0.01)
pub const INSTALLMENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Payment status of a sale, always derived from its payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "sale_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Unpaid,
    PartiallyPaid,
    FullyPaid,
}

impl SaleStatus {
    /// Status for a sale whose recorded payments sum to `total_paid`
    ///
    /// Nothing collected is UNPAID even when the sale total is zero.
    pub fn derive(total_paid: Decimal, sale_total: Decimal) -> Self {
        if total_paid <= Decimal::ZERO {
            SaleStatus::Unpaid
        } else if total_paid >= sale_total {
            SaleStatus::FullyPaid
        } else {
            SaleStatus::PartiallyPaid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Unpaid => "UNPAID",
            SaleStatus::PartiallyPaid => "PARTIALLY_PAID",
            SaleStatus::FullyPaid => "FULLY_PAID",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payment was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Cash,
    MtnMomo,
    AirtelMomo,
    Card,
    ProfMomo,
}

/// Financial terms of a sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub sale_total: Decimal,
    pub down_payment: Decimal,
    pub number_of_installments: i32,
    pub installment_amount: Decimal,
}

impl InstallmentPlan {
    /// Check that the schedule reconciles to the sale total
    pub fn validate(&self) -> Result<(), RuleViolation> {
        if self.sale_total < Decimal::ZERO {
            return Err(RuleViolation::input("sale_total", "must not be negative"));
        }
        if self.down_payment < Decimal::ZERO {
            return Err(RuleViolation::input("down_payment", "must not be negative"));
        }
        if self.installment_amount < Decimal::ZERO {
            return Err(RuleViolation::input(
                "installment_amount",
                "must not be negative",
            ));
        }
        if self.number_of_installments < 1 {
            return Err(RuleViolation::input(
                "number_of_installments",
                "must be at least 1",
            ));
        }
        if self.down_payment > self.sale_total {
            return Err(RuleViolation::input(
                "down_payment",
                "cannot exceed sale total",
            ));
        }

        if self.is_paid_upfront() {
            if (self.installment_amount - self.sale_total).abs() > INSTALLMENT_TOLERANCE {
                return Err(RuleViolation::input(
                    "installment_amount",
                    format!(
                        "for full payment, installment amount should equal sale total: {}, but got {}",
                        self.sale_total.normalize(),
                        self.installment_amount.normalize()
                    ),
                ));
            }
            return Ok(());
        }

        let scheduled = self
            .scheduled_total()
            .ok_or_else(|| RuleViolation::input("installment_amount", "is too large"))?;
        let remaining = self.remaining_after_down_payment();
        if (scheduled - remaining).abs() > INSTALLMENT_TOLERANCE {
            return Err(RuleViolation::input(
                "installment_amount",
                format!(
                    "installments don't match: {} x {} = {}, but should be {}",
                    self.number_of_installments,
                    self.installment_amount.normalize(),
                    scheduled.normalize(),
                    remaining.normalize()
                ),
            ));
        }

        Ok(())
    }

    /// The down payment settles the whole sale
    pub fn is_paid_upfront(&self) -> bool {
        self.down_payment == self.sale_total
    }

    pub fn remaining_after_down_payment(&self) -> Decimal {
        self.sale_total - self.down_payment
    }

    /// Sum of all installments; `None` when it does not fit a `Decimal`
    pub fn scheduled_total(&self) -> Option<Decimal> {
        Decimal::from(self.number_of_installments).checked_mul(self.installment_amount)
    }

    /// Whole installments covered by `total_paid` beyond the down payment
    pub fn installments_paid(&self, total_paid: Decimal) -> i32 {
        if self.is_paid_upfront() || total_paid >= self.sale_total {
            return self.number_of_installments;
        }
        if self.installment_amount <= Decimal::ZERO {
            return 0;
        }
        let beyond_down = (total_paid - self.down_payment).max(Decimal::ZERO);
        match beyond_down.checked_div(self.installment_amount) {
            Some(paid) => paid
                .floor()
                .to_i32()
                .unwrap_or(i32::MAX)
                .min(self.number_of_installments),
            None => self.number_of_installments,
        }
    }

    /// Due date of the next unpaid installment, one calendar month apart
    pub fn next_due_date(
        &self,
        sale_date: DateTime<Utc>,
        total_paid: Decimal,
    ) -> Option<DateTime<Utc>> {
        let paid = self.installments_paid(total_paid);
        if paid >= self.number_of_installments {
            return None;
        }
        sale_date.checked_add_months(Months::new(paid as u32 + 1))
    }

    /// Date on which the last installment falls due
    pub fn expected_completion_date(&self, sale_date: DateTime<Utc>) -> Option<DateTime<Utc>> {
        sale_date.checked_add_months(Months::new(self.number_of_installments.max(0) as u32))
    }
}

/// New total after adding `amount` on top of `already_paid`
///
/// Fails when the total would exceed the sale total, naming the largest
/// amount still accepted.
pub fn ensure_within_total(
    already_paid: Decimal,
    amount: Decimal,
    sale_total: Decimal,
) -> Result<Decimal, RuleViolation> {
    let new_total = already_paid
        .checked_add(amount)
        .ok_or_else(|| RuleViolation::input("amount", "is too large"))?;
    if new_total > sale_total {
        return Err(RuleViolation::input(
            "amount",
            format!(
                "payment exceeds remaining balance. Maximum allowed: {}",
                remaining_balance(already_paid, sale_total).normalize()
            ),
        ));
    }
    Ok(new_total)
}

pub fn remaining_balance(total_paid: Decimal, sale_total: Decimal) -> Decimal {
    (sale_total - total_paid).max(Decimal::ZERO)
}

/// Percentage of the sale collected, rounded to two decimals
///
/// Totals too large to scale by 100 are divided first; a ratio that still
/// overflows is capped at 100.
pub fn payment_progress(total_paid: Decimal, sale_total: Decimal) -> Decimal {
    if sale_total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let percent = match total_paid.checked_mul(Decimal::ONE_HUNDRED) {
        Some(scaled) => scaled.checked_div(sale_total),
        None => total_paid
            .checked_div(sale_total)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED)),
    };
    percent
        .unwrap_or(Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A project sale row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProjectSale {
    pub id: Uuid,
    pub client_id: Uuid,
    pub project_id: Uuid,
    pub cashier_id: Uuid,
    pub sale_total: Decimal,
    pub down_payment: Decimal,
    pub number_of_installments: i32,
    pub installment_amount: Decimal,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectSale {
    pub fn plan(&self) -> InstallmentPlan {
        InstallmentPlan {
            sale_total: self.sale_total,
            down_payment: self.down_payment,
            number_of_installments: self.number_of_installments,
            installment_amount: self.installment_amount,
        }
    }
}

/// A single payment against a sale
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProjectPayment {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub cashier_id: Uuid,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn plan(total: i64, down: i64, count: i32, amount: Decimal) -> InstallmentPlan {
        InstallmentPlan {
            sale_total: dec(total),
            down_payment: dec(down),
            number_of_installments: count,
            installment_amount: amount,
        }
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(SaleStatus::derive(Decimal::ZERO, dec(1000)), SaleStatus::Unpaid);
        assert_eq!(SaleStatus::derive(dec(200), dec(1000)), SaleStatus::PartiallyPaid);
        assert_eq!(SaleStatus::derive(dec(1000), dec(1000)), SaleStatus::FullyPaid);
    }

    #[test]
    fn test_zero_total_sale_starts_unpaid() {
        assert_eq!(SaleStatus::derive(Decimal::ZERO, Decimal::ZERO), SaleStatus::Unpaid);
    }

    #[test]
    fn test_plan_rejects_overflowing_schedule() {
        let amount = Decimal::from_str_exact("150000000000000000000000000").unwrap();
        let err = plan(1000, 0, 600, amount).validate().unwrap_err();
        assert!(matches!(err, RuleViolation::Input { ref field, .. } if field == "installment_amount"));
    }

    #[test]
    fn test_ensure_within_total_rejects_overflow() {
        let err = ensure_within_total(dec(200), Decimal::MAX, dec(1000)).unwrap_err();
        assert!(matches!(err, RuleViolation::Input { ref field, .. } if field == "amount"));
    }

    #[test]
    fn test_installments_paid_with_tiny_installment() {
        let p = InstallmentPlan {
            sale_total: Decimal::MAX,
            down_payment: Decimal::ZERO,
            number_of_installments: 12,
            installment_amount: Decimal::new(1, 28),
        };
        assert_eq!(p.installments_paid(dec(10)), 12);
    }

    #[test]
    fn test_plan_reconciles() {
        assert!(plan(1200, 200, 5, dec(200)).validate().is_ok());
    }

    #[test]
    fn test_plan_rejects_mismatched_installments() {
        let err = plan(1200, 200, 5, dec(150)).validate().unwrap_err();
        assert!(matches!(err, RuleViolation::Input { ref field, .. } if field == "installment_amount"));
    }

    #[test]
    fn test_plan_tolerates_rounding_cent() {
        // 3 x 333.33 = 999.99 against 1000
        let amount = Decimal::new(33333, 2);
        assert!(plan(1000, 0, 3, amount).validate().is_ok());
        let off = Decimal::new(33332, 2);
        assert!(plan(1000, 0, 3, off).validate().is_err());
    }

    #[test]
    fn test_plan_full_upfront_requires_single_line() {
        assert!(plan(500, 500, 1, dec(500)).validate().is_ok());
        assert!(plan(500, 500, 1, dec(100)).validate().is_err());
    }

    #[test]
    fn test_plan_rejects_oversized_down_payment() {
        assert!(plan(500, 600, 1, dec(0)).validate().is_err());
    }

    #[test]
    fn test_plan_rejects_zero_installments() {
        assert!(plan(500, 100, 0, dec(400)).validate().is_err());
    }

    #[test]
    fn test_ensure_within_total() {
        assert_eq!(ensure_within_total(dec(200), dec(800), dec(1000)).unwrap(), dec(1000));
        let err = ensure_within_total(dec(900), dec(200), dec(1000)).unwrap_err();
        assert!(err.to_string().contains("Maximum allowed: 100"));
    }

    #[test]
    fn test_installments_paid_counts_whole_installments() {
        let p = plan(1200, 200, 5, dec(200));
        assert_eq!(p.installments_paid(dec(200)), 0);
        assert_eq!(p.installments_paid(dec(399)), 0);
        assert_eq!(p.installments_paid(dec(400)), 1);
        assert_eq!(p.installments_paid(dec(1000)), 4);
        assert_eq!(p.installments_paid(dec(1200)), 5);
    }

    #[test]
    fn test_next_due_date() {
        let p = plan(1200, 200, 5, dec(200));
        let sold = Utc.with_ymd_and_hms(2024, 1, 31, 9, 0, 0).unwrap();
        assert_eq!(
            p.next_due_date(sold, dec(200)),
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 9, 0, 0).unwrap())
        );
        assert_eq!(
            p.next_due_date(sold, dec(600)),
            Some(Utc.with_ymd_and_hms(2024, 4, 30, 9, 0, 0).unwrap())
        );
        assert_eq!(p.next_due_date(sold, dec(1200)), None);
        assert_eq!(
            p.expected_completion_date(sold),
            Some(Utc.with_ymd_and_hms(2024, 6, 30, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_progress_and_balance() {
        assert_eq!(payment_progress(dec(200), dec(1000)), dec(20));
        assert_eq!(payment_progress(dec(1), dec(3)), Decimal::new(3333, 2));
        assert_eq!(payment_progress(dec(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(payment_progress(Decimal::MAX, Decimal::MAX), dec(100));
        assert_eq!(payment_progress(Decimal::MAX, Decimal::new(1, 2)), dec(100));
        assert_eq!(remaining_balance(dec(200), dec(1000)), dec(800));
        assert_eq!(remaining_balance(dec(1000), dec(1000)), Decimal::ZERO);
    }
}
