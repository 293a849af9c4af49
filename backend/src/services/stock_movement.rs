//! Inventory ledger: stock movements, two-phase transfers and positions
//!
//! Every mutation runs in one transaction. The inventory position is locked
//! with `SELECT ... FOR UPDATE` before its quantity is checked, so concurrent
//! movements on the same (item, store, unit) triple serialise.

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::services::directory::{self, Reference};
use shared::{
    credit, generate_transfer_id, normalize_text, parse_quantity, require_text,
    validate_confirmed_quantity, InventoryPosition, MovementCategory, MovementRecord,
    PaginatedResponse, Pagination, StockMovement, TransferStatus,
};

/// Times a position lookup is retried after losing a creation race
const POSITION_CREATE_ATTEMPTS: usize = 3;

/// Inventory ledger service
#[derive(Clone)]
pub struct StockMovementService {
    db: PgPool,
    transfer_id_attempts: u32,
}

/// Input for recording a stock movement
#[derive(Debug, Deserialize, Validate)]
pub struct RecordMovementInput {
    pub item_id: Uuid,
    pub store_id: Uuid,
    pub unit_id: Uuid,
    /// Decimal quantity as text, e.g. "12.5"
    #[validate(length(min = 1, max = 64))]
    pub quantity: String,
    pub category: MovementCategory,
    /// Acting employee; defaults to the authenticated employee
    pub employee_id: Option<Uuid>,
    pub to_store_id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub evidence: Vec<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(max = 255))]
    pub source: Option<String>,
    pub delivery_note_id: Option<Uuid>,
}

/// Input for confirming receipt of a transfer
#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmTransferInput {
    pub confirmed_qty: Decimal,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Input for rejecting a transfer
#[derive(Debug, Deserialize, Validate)]
pub struct RejectTransferInput {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

/// Input for annotating a movement as resolved
#[derive(Debug, Deserialize, Validate)]
pub struct ResolveConflictInput {
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Filter for listing movement records
#[derive(Debug, Default, Deserialize)]
pub struct MovementFilter {
    /// Matches the source or the destination store
    pub store_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub category: Option<MovementCategory>,
    pub transfer_status: Option<TransferStatus>,
}

/// Identifies one inventory position
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PositionKey {
    pub item_id: Uuid,
    pub store_id: Uuid,
    pub unit_id: Uuid,
}

impl StockMovementService {
    /// Create a new StockMovementService instance
    pub fn new(db: PgPool, config: &LedgerConfig) -> Self {
        Self {
            db,
            transfer_id_attempts: config.transfer_id_attempts.max(1),
        }
    }

    /// Record a restock, depletion, adjustment or transfer at a store
    pub async fn record_movement(
        &self,
        acting_employee: Uuid,
        input: RecordMovementInput,
    ) -> AppResult<MovementRecord> {
        let employee_id = input.employee_id.unwrap_or(acting_employee);
        let quantity = parse_quantity(&input.quantity)?;
        let movement =
            StockMovement::new(input.category, quantity, input.store_id, input.to_store_id)?;

        let mut tx = self.db.begin().await?;

        let store = directory::fetch_store(&mut *tx, input.store_id).await?;
        store.authorize(employee_id)?;
        directory::require(&mut *tx, Reference::Item, input.item_id).await?;
        directory::require(&mut *tx, Reference::Unit, input.unit_id).await?;
        if let Some(to_store_id) = movement.destination() {
            directory::require(&mut *tx, Reference::Store, to_store_id).await?;
        }

        let key = PositionKey {
            item_id: input.item_id,
            store_id: input.store_id,
            unit_id: input.unit_id,
        };
        let position = lock_position(&mut tx, key, movement.creates_position()).await?;
        let remaining = movement.apply(position.as_ref().map(|p| p.quantity))?;

        // `apply` fails for a missing position unless the movement creates one
        let position = position.ok_or_else(|| AppError::NotFound("Item in store".to_string()))?;
        set_position_quantity(&mut tx, position.id, remaining).await?;

        let (transfer_id, transfer_status, initiated_quantity) = match movement {
            StockMovement::Transfer { quantity, .. } => (
                Some(self.allocate_transfer_id(&mut tx).await?),
                Some(TransferStatus::Pending),
                Some(quantity),
            ),
            _ => (None, None, None),
        };

        let record = sqlx::query_as::<_, MovementRecord>(
            r#"
            INSERT INTO movement_records (
                item_id, store_id, to_store_id, unit_id, category, quantity,
                initiated_quantity, remaining_quantity, source, description, recorded_by,
                delivery_note_id, evidence, transfer_id, transfer_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(input.item_id)
        .bind(input.store_id)
        .bind(movement.destination())
        .bind(input.unit_id)
        .bind(movement.category())
        .bind(movement.quantity())
        .bind(initiated_quantity)
        .bind(remaining)
        .bind(normalize_text(input.source))
        .bind(normalize_text(input.description))
        .bind(employee_id)
        .bind(input.delivery_note_id)
        .bind(&input.evidence)
        .bind(&transfer_id)
        .bind(transfer_status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            record_id = %record.id,
            category = %record.category,
            store_id = %record.store_id,
            item_id = %record.item_id,
            quantity = %record.quantity,
            remaining = %record.remaining_quantity,
            transfer_id = ?record.transfer_id,
            "Stock movement recorded"
        );

        Ok(record)
    }

    /// Credit the destination store with the received quantity
    pub async fn confirm_transfer(
        &self,
        transfer_id: &str,
        input: ConfirmTransferInput,
    ) -> AppResult<MovementRecord> {
        let mut tx = self.db.begin().await?;

        let record = lock_transfer(&mut tx, transfer_id).await?;
        record.transfer_state()?.ensure_pending("confirm")?;
        validate_confirmed_quantity(input.confirmed_qty, record.deducted_quantity())?;

        let to_store_id = record.to_store_id.ok_or_else(|| {
            AppError::Internal(format!("Transfer {} has no destination store", transfer_id))
        })?;
        let key = PositionKey {
            item_id: record.item_id,
            store_id: to_store_id,
            unit_id: record.unit_id,
        };
        let destination = lock_position(&mut tx, key, true)
            .await?
            .ok_or_else(|| AppError::Internal("Destination position unavailable".to_string()))?;
        let credited = credit(Some(destination.quantity), input.confirmed_qty)?;
        set_position_quantity(&mut tx, destination.id, credited).await?;

        let confirmed = sqlx::query_as::<_, MovementRecord>(
            r#"
            UPDATE movement_records
            SET quantity = $2, transfer_status = $3, extra_note = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(input.confirmed_qty)
        .bind(TransferStatus::Confirmed)
        .bind(normalize_text(input.notes))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if confirmed.has_discrepancy() {
            tracing::warn!(
                transfer_id = %transfer_id,
                dispatched = %record.deducted_quantity(),
                received = %input.confirmed_qty,
                "Stock transfer received short"
            );
        }

        tracing::info!(
            transfer_id = %transfer_id,
            to_store_id = %to_store_id,
            confirmed_qty = %input.confirmed_qty,
            initiated_qty = %record.deducted_quantity(),
            "Stock transfer confirmed"
        );

        Ok(confirmed)
    }

    /// Return the dispatched quantity to the source store
    pub async fn reject_transfer(
        &self,
        transfer_id: &str,
        input: RejectTransferInput,
    ) -> AppResult<MovementRecord> {
        let reason = require_text("reason", &input.reason)?;

        let mut tx = self.db.begin().await?;

        let record = lock_transfer(&mut tx, transfer_id).await?;
        record.transfer_state()?.ensure_pending("reject")?;

        let key = PositionKey {
            item_id: record.item_id,
            store_id: record.store_id,
            unit_id: record.unit_id,
        };
        let source = lock_position(&mut tx, key, true)
            .await?
            .ok_or_else(|| AppError::Internal("Source position unavailable".to_string()))?;
        let restored = credit(Some(source.quantity), record.deducted_quantity())?;
        set_position_quantity(&mut tx, source.id, restored).await?;

        let rejected = sqlx::query_as::<_, MovementRecord>(
            r#"
            UPDATE movement_records
            SET transfer_status = $2, extra_note = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(TransferStatus::Rejected)
        .bind(&reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            transfer_id = %transfer_id,
            store_id = %record.store_id,
            restored_qty = %record.deducted_quantity(),
            "Stock transfer rejected"
        );

        Ok(rejected)
    }

    /// Mark a movement record as resolved; quantities are untouched
    pub async fn resolve_conflict(
        &self,
        record_id: Uuid,
        input: ResolveConflictInput,
    ) -> AppResult<MovementRecord> {
        let record = sqlx::query_as::<_, MovementRecord>(
            r#"
            UPDATE movement_records
            SET is_resolved = TRUE, resolve_notes = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(record_id)
        .bind(normalize_text(input.notes))
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock movement".to_string()))?;

        tracing::info!(record_id = %record_id, "Stock movement marked resolved");

        Ok(record)
    }

    /// List movement records, newest first
    pub async fn list_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<MovementRecord>> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM movement_records
            WHERE ($1::uuid IS NULL OR store_id = $1 OR to_store_id = $1)
              AND ($2::uuid IS NULL OR item_id = $2)
              AND ($3::movement_category IS NULL OR category = $3)
              AND ($4::transfer_status IS NULL OR transfer_status = $4)
            "#,
        )
        .bind(filter.store_id)
        .bind(filter.item_id)
        .bind(filter.category)
        .bind(filter.transfer_status)
        .fetch_one(&self.db)
        .await?;

        let records = sqlx::query_as::<_, MovementRecord>(
            r#"
            SELECT * FROM movement_records
            WHERE ($1::uuid IS NULL OR store_id = $1 OR to_store_id = $1)
              AND ($2::uuid IS NULL OR item_id = $2)
              AND ($3::movement_category IS NULL OR category = $3)
              AND ($4::transfer_status IS NULL OR transfer_status = $4)
            ORDER BY created_at DESC, id
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.store_id)
        .bind(filter.item_id)
        .bind(filter.category)
        .bind(filter.transfer_status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(
            records,
            &pagination,
            total.max(0) as u64,
        ))
    }

    /// Get a movement record by id
    pub async fn get_movement(&self, record_id: Uuid) -> AppResult<MovementRecord> {
        sqlx::query_as::<_, MovementRecord>("SELECT * FROM movement_records WHERE id = $1")
            .bind(record_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock movement".to_string()))
    }

    /// Get a transfer record by its transfer id
    pub async fn get_transfer(&self, transfer_id: &str) -> AppResult<MovementRecord> {
        sqlx::query_as::<_, MovementRecord>(
            "SELECT * FROM movement_records WHERE transfer_id = $1 AND category = $2",
        )
        .bind(transfer_id.trim().to_ascii_uppercase())
        .bind(MovementCategory::Transfer)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock transfer".to_string()))
    }

    /// Pending transfers awaiting confirmation at a store
    pub async fn list_pending_transfers(&self, store_id: Uuid) -> AppResult<Vec<MovementRecord>> {
        directory::require(&self.db, Reference::Store, store_id).await?;

        let records = sqlx::query_as::<_, MovementRecord>(
            r#"
            SELECT * FROM movement_records
            WHERE to_store_id = $1 AND category = $2 AND transfer_status = $3
            ORDER BY created_at
            "#,
        )
        .bind(store_id)
        .bind(MovementCategory::Transfer)
        .bind(TransferStatus::Pending)
        .fetch_all(&self.db)
        .await?;

        Ok(records)
    }

    /// All inventory positions held at a store
    pub async fn store_positions(&self, store_id: Uuid) -> AppResult<Vec<InventoryPosition>> {
        directory::require(&self.db, Reference::Store, store_id).await?;

        let positions = sqlx::query_as::<_, InventoryPosition>(
            r#"
            SELECT * FROM inventory_positions
            WHERE store_id = $1
            ORDER BY item_id, unit_id
            "#,
        )
        .bind(store_id)
        .fetch_all(&self.db)
        .await?;

        Ok(positions)
    }

    /// Position for a single (item, store, unit) triple
    pub async fn get_position(&self, key: PositionKey) -> AppResult<InventoryPosition> {
        sqlx::query_as::<_, InventoryPosition>(
            r#"
            SELECT * FROM inventory_positions
            WHERE item_id = $1 AND store_id = $2 AND unit_id = $3
            "#,
        )
        .bind(key.item_id)
        .bind(key.store_id)
        .bind(key.unit_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Item in store".to_string()))
    }

    /// Draw transfer ids until one is unused, inside the caller's transaction
    async fn allocate_transfer_id(&self, conn: &mut PgConnection) -> AppResult<String> {
        for _ in 0..self.transfer_id_attempts {
            let candidate = {
                let mut rng = rand::thread_rng();
                generate_transfer_id(&mut rng)
            };
            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM movement_records WHERE transfer_id = $1)",
            )
            .bind(&candidate)
            .fetch_one(&mut *conn)
            .await?;

            if !taken {
                return Ok(candidate);
            }
            tracing::debug!(candidate = %candidate, "Transfer id collision, drawing again");
        }

        Err(AppError::Internal(format!(
            "Could not allocate a unique transfer id after {} attempts",
            self.transfer_id_attempts
        )))
    }
}

/// Lock the position for `key`, creating an empty one when `create` is set
///
/// Returns `None` only when the position is missing and `create` is false.
async fn lock_position(
    conn: &mut PgConnection,
    key: PositionKey,
    create: bool,
) -> AppResult<Option<InventoryPosition>> {
    for _ in 0..POSITION_CREATE_ATTEMPTS {
        let existing = sqlx::query_as::<_, InventoryPosition>(
            r#"
            SELECT * FROM inventory_positions
            WHERE item_id = $1 AND store_id = $2 AND unit_id = $3
            FOR UPDATE
            "#,
        )
        .bind(key.item_id)
        .bind(key.store_id)
        .bind(key.unit_id)
        .fetch_optional(&mut *conn)
        .await?;

        if existing.is_some() || !create {
            return Ok(existing);
        }

        // The inserted row is held by this transaction until commit
        let inserted = sqlx::query_as::<_, InventoryPosition>(
            r#"
            INSERT INTO inventory_positions (item_id, store_id, unit_id, quantity)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (item_id, store_id, unit_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(key.item_id)
        .bind(key.store_id)
        .bind(key.unit_id)
        .fetch_optional(&mut *conn)
        .await?;

        if inserted.is_some() {
            return Ok(inserted);
        }
        tracing::debug!(
            item_id = %key.item_id,
            store_id = %key.store_id,
            "Position created concurrently, locking again"
        );
    }

    Err(AppError::Conflict(
        "Inventory position is being modified concurrently, retry the request".to_string(),
    ))
}

async fn set_position_quantity(
    conn: &mut PgConnection,
    position_id: Uuid,
    quantity: Decimal,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE inventory_positions SET quantity = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(position_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Lock a transfer record by its transfer id
async fn lock_transfer(conn: &mut PgConnection, transfer_id: &str) -> AppResult<MovementRecord> {
    sqlx::query_as::<_, MovementRecord>(
        r#"
        SELECT * FROM movement_records
        WHERE transfer_id = $1 AND category = $2
        FOR UPDATE
        "#,
    )
    .bind(transfer_id.trim().to_ascii_uppercase())
    .bind(MovementCategory::Transfer)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Stock transfer".to_string()))
}
