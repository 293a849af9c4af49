//! Payments against project sales
//!
//! The sale row is locked before payments are summed so that the total paid
//! can never exceed the sale total, and the sale status is re-derived in the
//! same transaction as every change to its payments.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::directory::{self, Reference};
use crate::services::project_sale::{
    fetch_sale, list_payments, lock_sale, store_status, sum_payments,
};
use shared::{
    ensure_within_total, normalize_text, payment_progress, remaining_balance,
    validate_positive, PaymentMethod, ProjectPayment, ProjectSale, SaleStatus,
};

/// Project payment service
#[derive(Clone)]
pub struct ProjectPaymentService {
    db: PgPool,
}

/// Input for recording a payment
#[derive(Debug, Deserialize, Validate)]
pub struct AddPaymentInput {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    /// Defaults to the authenticated employee
    pub cashier_id: Option<Uuid>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Input for modifying a payment; omitted fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ModifyPaymentInput {
    pub amount: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub cashier_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl ModifyPaymentInput {
    fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.payment_method.is_none()
            && self.reference.is_none()
            && self.notes.is_none()
            && self.cashier_id.is_none()
            && self.paid_at.is_none()
    }
}

/// Collection figures for one sale
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSummary {
    pub sale_id: Uuid,
    pub sale_total: Decimal,
    pub total_paid: Decimal,
    pub remaining_balance: Decimal,
    pub payment_progress: Decimal,
    pub payments_made: usize,
    pub status: SaleStatus,
}

impl ProjectPaymentService {
    /// Create a new ProjectPaymentService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a payment and re-derive the sale status
    pub async fn add_payment(
        &self,
        acting_employee: Uuid,
        sale_id: Uuid,
        input: AddPaymentInput,
    ) -> AppResult<ProjectPayment> {
        validate_positive("amount", input.amount)?;
        let cashier_id = input.cashier_id.unwrap_or(acting_employee);

        let mut tx = self.db.begin().await?;

        let sale = lock_sale(&mut tx, sale_id).await?;
        directory::require(&mut *tx, Reference::Employee, cashier_id).await?;

        let already_paid = sum_payments(&mut tx, sale_id, None).await?;
        let total_paid = ensure_within_total(already_paid, input.amount, sale.sale_total)?;

        let payment = sqlx::query_as::<_, ProjectPayment>(
            r#"
            INSERT INTO project_payments (
                sale_id, amount, payment_method, reference, notes, cashier_id, paid_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, NOW()))
            RETURNING *
            "#,
        )
        .bind(sale_id)
        .bind(input.amount)
        .bind(input.payment_method)
        .bind(normalize_text(input.reference))
        .bind(normalize_text(input.notes))
        .bind(cashier_id)
        .bind(input.paid_at)
        .fetch_one(&mut *tx)
        .await?;

        store_status(&mut tx, &sale, total_paid).await?;

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            sale_id = %sale_id,
            amount = %payment.amount,
            total_paid = %total_paid,
            "Project payment recorded"
        );

        Ok(payment)
    }

    /// Change a payment; a new amount is checked against the other payments
    pub async fn modify_payment(
        &self,
        payment_id: Uuid,
        input: ModifyPaymentInput,
    ) -> AppResult<ProjectPayment> {
        if input.is_empty() {
            return self.get_payment(payment_id).await;
        }
        if let Some(amount) = input.amount {
            validate_positive("amount", amount)?;
        }

        let mut tx = self.db.begin().await?;

        let sale = lock_payment_sale(&mut tx, payment_id).await?;
        if let Some(cashier_id) = input.cashier_id {
            directory::require(&mut *tx, Reference::Employee, cashier_id).await?;
        }

        let new_total = match input.amount {
            Some(amount) => {
                let other_payments = sum_payments(&mut tx, sale.id, Some(payment_id)).await?;
                Some(ensure_within_total(other_payments, amount, sale.sale_total)?)
            }
            None => None,
        };

        let payment = sqlx::query_as::<_, ProjectPayment>(
            r#"
            UPDATE project_payments
            SET amount = COALESCE($2, amount),
                payment_method = COALESCE($3, payment_method),
                reference = COALESCE($4, reference),
                notes = COALESCE($5, notes),
                cashier_id = COALESCE($6, cashier_id),
                paid_at = COALESCE($7, paid_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(input.amount)
        .bind(input.payment_method)
        .bind(normalize_text(input.reference))
        .bind(normalize_text(input.notes))
        .bind(input.cashier_id)
        .bind(input.paid_at)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(total_paid) = new_total {
            store_status(&mut tx, &sale, total_paid).await?;
        }

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment_id,
            sale_id = %sale.id,
            amount = %payment.amount,
            "Project payment modified"
        );

        Ok(payment)
    }

    /// Delete a payment and re-derive the sale status from what remains
    pub async fn delete_payment(&self, payment_id: Uuid) -> AppResult<ProjectSale> {
        let mut tx = self.db.begin().await?;

        let sale = lock_payment_sale(&mut tx, payment_id).await?;

        sqlx::query("DELETE FROM project_payments WHERE id = $1")
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;

        let total_paid = sum_payments(&mut tx, sale.id, None).await?;
        let status = store_status(&mut tx, &sale, total_paid).await?;

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment_id,
            sale_id = %sale.id,
            total_paid = %total_paid,
            "Project payment deleted"
        );

        Ok(ProjectSale { status, ..sale })
    }

    /// Get a payment by id
    pub async fn get_payment(&self, payment_id: Uuid) -> AppResult<ProjectPayment> {
        sqlx::query_as::<_, ProjectPayment>("SELECT * FROM project_payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Project payment".to_string()))
    }

    /// Payments of a sale in the order they were made
    pub async fn payments_by_sale(&self, sale_id: Uuid) -> AppResult<Vec<ProjectPayment>> {
        fetch_sale(&self.db, sale_id).await?;
        list_payments(&self.db, sale_id).await
    }

    /// Total paid, balance and progress of a sale
    pub async fn payment_summary(&self, sale_id: Uuid) -> AppResult<PaymentSummary> {
        let sale = fetch_sale(&self.db, sale_id).await?;
        let payments = list_payments(&self.db, sale_id).await?;
        let total_paid: Decimal = payments.iter().map(|p| p.amount).sum();

        Ok(PaymentSummary {
            sale_id,
            sale_total: sale.sale_total,
            total_paid,
            remaining_balance: remaining_balance(total_paid, sale.sale_total),
            payment_progress: payment_progress(total_paid, sale.sale_total),
            payments_made: payments.len(),
            status: sale.status,
        })
    }
}

/// Lock the sale a payment belongs to, then the payment itself
///
/// The sale is locked first, matching the order used when adding payments.
async fn lock_payment_sale(
    conn: &mut sqlx::PgConnection,
    payment_id: Uuid,
) -> AppResult<ProjectSale> {
    let sale_id = sqlx::query_scalar::<_, Uuid>(
        "SELECT sale_id FROM project_payments WHERE id = $1",
    )
    .bind(payment_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Project payment".to_string()))?;

    let sale = lock_sale(&mut *conn, sale_id).await?;

    // The payment may have been deleted while waiting for the sale lock
    let still_there = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM project_payments WHERE id = $1 AND sale_id = $2 FOR UPDATE",
    )
    .bind(payment_id)
    .bind(sale_id)
    .fetch_optional(&mut *conn)
    .await?;

    if still_there.is_none() {
        return Err(AppError::NotFound("Project payment".to_string()));
    }

    Ok(sale)
}
