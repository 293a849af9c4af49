//! Installment sale ledger: project sales and their payment schedule

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::directory::{self, Reference};
use shared::{
    payment_progress, remaining_balance, InstallmentPlan, PaginatedResponse, Pagination,
    PaymentMethod, ProjectPayment, ProjectSale, RuleViolation, SaleStatus, SummaryPeriod,
};

/// Project sale service
#[derive(Clone)]
pub struct ProjectSaleService {
    db: PgPool,
}

/// Input for creating a project sale
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSaleInput {
    pub client_id: Uuid,
    pub project_id: Uuid,
    /// Defaults to the authenticated employee
    pub cashier_id: Option<Uuid>,
    pub sale_total: Decimal,
    pub down_payment: Decimal,
    #[validate(range(min = 1, max = 600))]
    pub number_of_installments: i32,
    pub installment_amount: Decimal,
    /// Method recorded on the down payment, CASH when omitted
    pub down_payment_method: Option<PaymentMethod>,
}

/// Input for updating a sale that has no payments yet
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSaleInput {
    pub client_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub cashier_id: Option<Uuid>,
    pub sale_total: Option<Decimal>,
    pub down_payment: Option<Decimal>,
    #[validate(range(min = 1, max = 600))]
    pub number_of_installments: Option<i32>,
    pub installment_amount: Option<Decimal>,
}

/// Filter for listing sales
#[derive(Debug, Default, Deserialize)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub client_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

/// Query for the sales summary
#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub period: Option<SummaryPeriod>,
}

/// A sale with its payments and computed balances
#[derive(Debug, Clone, Serialize)]
pub struct SaleDetails {
    #[serde(flatten)]
    pub sale: ProjectSale,
    pub payments: Vec<ProjectPayment>,
    pub total_paid: Decimal,
    pub remaining_balance: Decimal,
    pub payment_progress: Decimal,
    pub payments_made: usize,
    pub next_installment_due: Option<DateTime<Utc>>,
}

impl SaleDetails {
    pub fn new(sale: ProjectSale, payments: Vec<ProjectPayment>) -> Self {
        let total_paid: Decimal = payments.iter().map(|p| p.amount).sum();
        let next_installment_due = if sale.status == SaleStatus::FullyPaid {
            None
        } else {
            sale.plan().next_due_date(sale.created_at, total_paid)
        };

        Self {
            total_paid,
            remaining_balance: remaining_balance(total_paid, sale.sale_total),
            payment_progress: payment_progress(total_paid, sale.sale_total),
            payments_made: payments.len(),
            next_installment_due,
            sale,
            payments,
        }
    }
}

/// Installment schedule of a sale
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSchedule {
    pub sale_id: Uuid,
    pub sale_total: Decimal,
    pub down_payment: Decimal,
    pub number_of_installments: i32,
    pub installment_amount: Decimal,
    pub installments_paid: i32,
    pub installments_remaining: i32,
    pub total_paid: Decimal,
    pub remaining_balance: Decimal,
    pub next_due_date: Option<DateTime<Utc>>,
    pub expected_completion_date: Option<DateTime<Utc>>,
    pub payment_history: Vec<ProjectPayment>,
}

impl PaymentSchedule {
    pub fn new(sale: &ProjectSale, payments: Vec<ProjectPayment>) -> Self {
        let plan = sale.plan();
        let total_paid: Decimal = payments.iter().map(|p| p.amount).sum();
        let installments_paid = plan.installments_paid(total_paid);
        let next_due_date = if sale.status == SaleStatus::FullyPaid {
            None
        } else {
            plan.next_due_date(sale.created_at, total_paid)
        };

        Self {
            sale_id: sale.id,
            sale_total: sale.sale_total,
            down_payment: sale.down_payment,
            number_of_installments: sale.number_of_installments,
            installment_amount: sale.installment_amount,
            installments_paid,
            installments_remaining: (sale.number_of_installments - installments_paid).max(0),
            total_paid,
            remaining_balance: remaining_balance(total_paid, sale.sale_total),
            next_due_date,
            expected_completion_date: plan.expected_completion_date(sale.created_at),
            payment_history: payments,
        }
    }
}

/// Aggregate figures over sales created in a period
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SalesSummary {
    pub total_sales: i64,
    pub total_revenue: Decimal,
    pub total_collected: Decimal,
    pub unpaid: i64,
    pub partially_paid: i64,
    pub fully_paid: i64,
}

impl ProjectSaleService {
    /// Create a new ProjectSaleService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a sale, recording the down payment when there is one
    pub async fn create_sale(
        &self,
        acting_employee: Uuid,
        input: CreateSaleInput,
    ) -> AppResult<SaleDetails> {
        let cashier_id = input.cashier_id.unwrap_or(acting_employee);
        let plan = InstallmentPlan {
            sale_total: input.sale_total,
            down_payment: input.down_payment,
            number_of_installments: input.number_of_installments,
            installment_amount: input.installment_amount,
        };
        plan.validate()?;

        let mut tx = self.db.begin().await?;

        directory::require(&mut *tx, Reference::Client, input.client_id).await?;
        directory::require(&mut *tx, Reference::Project, input.project_id).await?;
        directory::require(&mut *tx, Reference::Employee, cashier_id).await?;

        let status = SaleStatus::derive(plan.down_payment, plan.sale_total);
        let sale = sqlx::query_as::<_, ProjectSale>(
            r#"
            INSERT INTO project_sales (
                client_id, project_id, cashier_id, sale_total, down_payment,
                number_of_installments, installment_amount, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(input.client_id)
        .bind(input.project_id)
        .bind(cashier_id)
        .bind(plan.sale_total)
        .bind(plan.down_payment)
        .bind(plan.number_of_installments)
        .bind(plan.installment_amount)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;

        let mut payments = Vec::new();
        if plan.down_payment > Decimal::ZERO {
            let down_payment = sqlx::query_as::<_, ProjectPayment>(
                r#"
                INSERT INTO project_payments (sale_id, amount, payment_method, notes, cashier_id)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
                "#,
            )
            .bind(sale.id)
            .bind(plan.down_payment)
            .bind(input.down_payment_method.unwrap_or_default())
            .bind("Down payment")
            .bind(cashier_id)
            .fetch_one(&mut *tx)
            .await?;
            payments.push(down_payment);
        }

        tx.commit().await?;

        tracing::info!(
            sale_id = %sale.id,
            sale_total = %sale.sale_total,
            down_payment = %sale.down_payment,
            installments = sale.number_of_installments,
            status = %sale.status,
            "Project sale created"
        );

        Ok(SaleDetails::new(sale, payments))
    }

    /// Get a sale with its payments and balances
    pub async fn get_sale(&self, sale_id: Uuid) -> AppResult<SaleDetails> {
        let sale = fetch_sale(&self.db, sale_id).await?;
        let payments = list_payments(&self.db, sale_id).await?;
        Ok(SaleDetails::new(sale, payments))
    }

    /// List sales, newest first
    pub async fn list_sales(
        &self,
        filter: SaleFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<ProjectSale>> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM project_sales
            WHERE ($1::sale_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR client_id = $2)
              AND ($3::uuid IS NULL OR project_id = $3)
            "#,
        )
        .bind(filter.status)
        .bind(filter.client_id)
        .bind(filter.project_id)
        .fetch_one(&self.db)
        .await?;

        let sales = sqlx::query_as::<_, ProjectSale>(
            r#"
            SELECT * FROM project_sales
            WHERE ($1::sale_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR client_id = $2)
              AND ($3::uuid IS NULL OR project_id = $3)
            ORDER BY created_at DESC, id
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.status)
        .bind(filter.client_id)
        .bind(filter.project_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(sales, &pagination, total.max(0) as u64))
    }

    /// Change the terms of a sale that has no payments recorded
    pub async fn update_sale(&self, sale_id: Uuid, input: UpdateSaleInput) -> AppResult<ProjectSale> {
        let mut tx = self.db.begin().await?;

        let sale = lock_sale(&mut tx, sale_id).await?;
        ensure_no_payments(&mut tx, sale_id, "modify").await?;

        // A down payment is only ever recorded as a payment row at creation
        if let Some(down_payment) = input.down_payment {
            if down_payment > Decimal::ZERO && down_payment != sale.down_payment {
                return Err(RuleViolation::input(
                    "down_payment",
                    "cannot be raised after the sale is created; record a payment instead",
                )
                .into());
            }
        }

        let plan = InstallmentPlan {
            sale_total: input.sale_total.unwrap_or(sale.sale_total),
            down_payment: input.down_payment.unwrap_or(sale.down_payment),
            number_of_installments: input
                .number_of_installments
                .unwrap_or(sale.number_of_installments),
            installment_amount: input.installment_amount.unwrap_or(sale.installment_amount),
        };
        plan.validate()?;

        if let Some(client_id) = input.client_id {
            directory::require(&mut *tx, Reference::Client, client_id).await?;
        }
        if let Some(project_id) = input.project_id {
            directory::require(&mut *tx, Reference::Project, project_id).await?;
        }
        if let Some(cashier_id) = input.cashier_id {
            directory::require(&mut *tx, Reference::Employee, cashier_id).await?;
        }

        let updated = sqlx::query_as::<_, ProjectSale>(
            r#"
            UPDATE project_sales
            SET client_id = $2, project_id = $3, cashier_id = $4, sale_total = $5,
                down_payment = $6, number_of_installments = $7, installment_amount = $8,
                status = $9, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(sale_id)
        .bind(input.client_id.unwrap_or(sale.client_id))
        .bind(input.project_id.unwrap_or(sale.project_id))
        .bind(input.cashier_id.unwrap_or(sale.cashier_id))
        .bind(plan.sale_total)
        .bind(plan.down_payment)
        .bind(plan.number_of_installments)
        .bind(plan.installment_amount)
        .bind(SaleStatus::derive(Decimal::ZERO, plan.sale_total))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(sale_id = %sale_id, sale_total = %updated.sale_total, "Project sale updated");

        Ok(updated)
    }

    /// Delete a sale that has no payments recorded
    pub async fn delete_sale(&self, sale_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        lock_sale(&mut tx, sale_id).await?;
        ensure_no_payments(&mut tx, sale_id, "delete").await?;

        sqlx::query("DELETE FROM project_sales WHERE id = $1")
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(sale_id = %sale_id, "Project sale deleted");

        Ok(())
    }

    /// Installments paid and due for a sale
    pub async fn payment_schedule(&self, sale_id: Uuid) -> AppResult<PaymentSchedule> {
        let sale = fetch_sale(&self.db, sale_id).await?;
        let payments = list_payments(&self.db, sale_id).await?;
        Ok(PaymentSchedule::new(&sale, payments))
    }

    /// Totals over sales created within `period`, or over all sales
    pub async fn sales_summary(&self, period: Option<SummaryPeriod>) -> AppResult<SalesSummary> {
        let since = period.map(|p| p.start(Utc::now()));

        let summary = sqlx::query_as::<_, SalesSummary>(
            r#"
            SELECT
                COUNT(*) AS total_sales,
                COALESCE(SUM(s.sale_total), 0) AS total_revenue,
                COALESCE(SUM(paid.amount), 0) AS total_collected,
                COUNT(*) FILTER (WHERE s.status = 'UNPAID') AS unpaid,
                COUNT(*) FILTER (WHERE s.status = 'PARTIALLY_PAID') AS partially_paid,
                COUNT(*) FILTER (WHERE s.status = 'FULLY_PAID') AS fully_paid
            FROM project_sales s
            LEFT JOIN (
                SELECT sale_id, SUM(amount) AS amount
                FROM project_payments
                GROUP BY sale_id
            ) paid ON paid.sale_id = s.id
            WHERE ($1::timestamptz IS NULL OR s.created_at >= $1)
            "#,
        )
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        Ok(summary)
    }
}

/// Load a sale without locking it
pub(crate) async fn fetch_sale(db: &PgPool, sale_id: Uuid) -> AppResult<ProjectSale> {
    sqlx::query_as::<_, ProjectSale>("SELECT * FROM project_sales WHERE id = $1")
        .bind(sale_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Project sale".to_string()))
}

/// Lock a sale row; all payment writes for the sale queue behind this lock
pub(crate) async fn lock_sale(conn: &mut PgConnection, sale_id: Uuid) -> AppResult<ProjectSale> {
    sqlx::query_as::<_, ProjectSale>("SELECT * FROM project_sales WHERE id = $1 FOR UPDATE")
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Project sale".to_string()))
}

/// Payments of a sale in the order they were made
pub(crate) async fn list_payments(db: &PgPool, sale_id: Uuid) -> AppResult<Vec<ProjectPayment>> {
    let payments = sqlx::query_as::<_, ProjectPayment>(
        r#"
        SELECT * FROM project_payments
        WHERE sale_id = $1
        ORDER BY paid_at, created_at
        "#,
    )
    .bind(sale_id)
    .fetch_all(db)
    .await?;

    Ok(payments)
}

/// Sum of a sale's payments, optionally leaving one payment out
pub(crate) async fn sum_payments(
    conn: &mut PgConnection,
    sale_id: Uuid,
    excluding: Option<Uuid>,
) -> AppResult<Decimal> {
    let total = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(amount), 0) FROM project_payments
        WHERE sale_id = $1 AND ($2::uuid IS NULL OR id <> $2)
        "#,
    )
    .bind(sale_id)
    .bind(excluding)
    .fetch_one(&mut *conn)
    .await?;

    Ok(total)
}

/// Persist the status derived from `total_paid`
pub(crate) async fn store_status(
    conn: &mut PgConnection,
    sale: &ProjectSale,
    total_paid: Decimal,
) -> AppResult<SaleStatus> {
    let status = SaleStatus::derive(total_paid, sale.sale_total);

    sqlx::query("UPDATE project_sales SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(sale.id)
        .bind(status)
        .execute(&mut *conn)
        .await?;

    if status != sale.status {
        tracing::info!(
            sale_id = %sale.id,
            from = %sale.status,
            to = %status,
            total_paid = %total_paid,
            "Project sale status changed"
        );
    }

    Ok(status)
}

async fn ensure_no_payments(conn: &mut PgConnection, sale_id: Uuid, action: &str) -> AppResult<()> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM project_payments WHERE sale_id = $1",
    )
    .bind(sale_id)
    .fetch_one(&mut *conn)
    .await?;

    if count > 0 {
        return Err(RuleViolation::input(
            "sale",
            format!("cannot {} a sale that already has payments", action),
        )
        .into());
    }

    Ok(())
}
