//! HTTP handlers for project payments

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::project_payment::{
    AddPaymentInput, ModifyPaymentInput, PaymentSummary, ProjectPaymentService,
};
use crate::AppState;
use shared::{ProjectPayment, ProjectSale};

/// Record a payment against a sale
pub async fn add_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<Uuid>,
    Json(input): Json<AddPaymentInput>,
) -> AppResult<(StatusCode, Json<ProjectPayment>)> {
    input.validate()?;
    let service = ProjectPaymentService::new(state.db);
    let payment = service
        .add_payment(current_user.0.employee_id, sale_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// Payments of a sale
pub async fn payments_by_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<Vec<ProjectPayment>>> {
    let service = ProjectPaymentService::new(state.db);
    let payments = service.payments_by_sale(sale_id).await?;
    Ok(Json(payments))
}

/// Collection summary of a sale
pub async fn payment_summary(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<PaymentSummary>> {
    let service = ProjectPaymentService::new(state.db);
    let summary = service.payment_summary(sale_id).await?;
    Ok(Json(summary))
}

/// Get a payment
pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<ProjectPayment>> {
    let service = ProjectPaymentService::new(state.db);
    let payment = service.get_payment(payment_id).await?;
    Ok(Json(payment))
}

/// Modify a payment
pub async fn modify_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(input): Json<ModifyPaymentInput>,
) -> AppResult<Json<ProjectPayment>> {
    input.validate()?;
    let service = ProjectPaymentService::new(state.db);
    let payment = service.modify_payment(payment_id, input).await?;
    Ok(Json(payment))
}

/// Delete a payment, returning the sale with its re-derived status
pub async fn delete_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<ProjectSale>> {
    let service = ProjectPaymentService::new(state.db);
    let sale = service.delete_payment(payment_id).await?;
    Ok(Json(sale))
}
