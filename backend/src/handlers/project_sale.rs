//! HTTP handlers for project sales

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::project_sale::{
    CreateSaleInput, PaymentSchedule, ProjectSaleService, SaleDetails, SaleFilter, SalesSummary,
    SummaryQuery, UpdateSaleInput,
};
use crate::AppState;
use shared::{PaginatedResponse, Pagination, ProjectSale};

/// Create a project sale
pub async fn create_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateSaleInput>,
) -> AppResult<(StatusCode, Json<SaleDetails>)> {
    input.validate()?;
    let service = ProjectSaleService::new(state.db);
    let sale = service
        .create_sale(current_user.0.employee_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

/// List project sales
pub async fn list_sales(
    State(state): State<AppState>,
    Query(filter): Query<SaleFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<ProjectSale>>> {
    let service = ProjectSaleService::new(state.db);
    let sales = service.list_sales(filter, pagination).await?;
    Ok(Json(sales))
}

/// Get a project sale with its payments
pub async fn get_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<SaleDetails>> {
    let service = ProjectSaleService::new(state.db);
    let sale = service.get_sale(sale_id).await?;
    Ok(Json(sale))
}

/// Update a project sale without payments
pub async fn update_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    Json(input): Json<UpdateSaleInput>,
) -> AppResult<Json<ProjectSale>> {
    input.validate()?;
    let service = ProjectSaleService::new(state.db);
    let sale = service.update_sale(sale_id, input).await?;
    Ok(Json(sale))
}

/// Delete a project sale without payments
pub async fn delete_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = ProjectSaleService::new(state.db);
    service.delete_sale(sale_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Installment schedule of a sale
pub async fn payment_schedule(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<PaymentSchedule>> {
    let service = ProjectSaleService::new(state.db);
    let schedule = service.payment_schedule(sale_id).await?;
    Ok(Json(schedule))
}

/// Sales summary for a period
pub async fn sales_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<SalesSummary>> {
    let service = ProjectSaleService::new(state.db);
    let summary = service.sales_summary(query.period).await?;
    Ok(Json(summary))
}
