//! HTTP handlers for the inventory ledger

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::stock_movement::{
    ConfirmTransferInput, MovementFilter, PositionKey, RecordMovementInput, RejectTransferInput,
    ResolveConflictInput, StockMovementService,
};
use crate::AppState;
use shared::{InventoryPosition, MovementRecord, PaginatedResponse, Pagination};

fn service(state: &AppState) -> StockMovementService {
    StockMovementService::new(state.db.clone(), &state.config.ledger)
}

/// Record a stock movement
pub async fn record_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<RecordMovementInput>,
) -> AppResult<(StatusCode, Json<MovementRecord>)> {
    input.validate()?;
    let record = service(&state)
        .record_movement(current_user.0.employee_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// List movement records
pub async fn list_movements(
    State(state): State<AppState>,
    Query(filter): Query<MovementFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<MovementRecord>>> {
    let records = service(&state).list_movements(filter, pagination).await?;
    Ok(Json(records))
}

/// Get a movement record
pub async fn get_movement(
    State(state): State<AppState>,
    Path(record_id): Path<Uuid>,
) -> AppResult<Json<MovementRecord>> {
    let record = service(&state).get_movement(record_id).await?;
    Ok(Json(record))
}

/// Mark a movement record as resolved
pub async fn resolve_conflict(
    State(state): State<AppState>,
    Path(record_id): Path<Uuid>,
    Json(input): Json<ResolveConflictInput>,
) -> AppResult<Json<MovementRecord>> {
    input.validate()?;
    let record = service(&state).resolve_conflict(record_id, input).await?;
    Ok(Json(record))
}

/// Get a transfer by its transfer id
pub async fn get_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<String>,
) -> AppResult<Json<MovementRecord>> {
    let record = service(&state).get_transfer(&transfer_id).await?;
    Ok(Json(record))
}

/// Confirm receipt of a transfer
pub async fn confirm_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<String>,
    Json(input): Json<ConfirmTransferInput>,
) -> AppResult<Json<MovementRecord>> {
    input.validate()?;
    let record = service(&state).confirm_transfer(&transfer_id, input).await?;
    Ok(Json(record))
}

/// Reject a transfer
pub async fn reject_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<String>,
    Json(input): Json<RejectTransferInput>,
) -> AppResult<Json<MovementRecord>> {
    input.validate()?;
    let record = service(&state).reject_transfer(&transfer_id, input).await?;
    Ok(Json(record))
}

/// Pending transfers inbound to a store
pub async fn list_pending_transfers(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
) -> AppResult<Json<Vec<MovementRecord>>> {
    let records = service(&state).list_pending_transfers(store_id).await?;
    Ok(Json(records))
}

/// Inventory positions of a store
pub async fn store_positions(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
) -> AppResult<Json<Vec<InventoryPosition>>> {
    let positions = service(&state).store_positions(store_id).await?;
    Ok(Json(positions))
}

/// Inventory position for an (item, store, unit) triple
pub async fn get_position(
    State(state): State<AppState>,
    Query(key): Query<PositionKey>,
) -> AppResult<Json<InventoryPosition>> {
    let position = service(&state).get_position(key).await?;
    Ok(Json(position))
}
