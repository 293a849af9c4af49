//! Stock movement models
//!
//! A movement request is modelled as [`StockMovement`], one variant per
//! category, so that the quantity rules for each category are matched
//! exhaustively. Positions and movement records mirror the persisted rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RuleViolation;

/// Movement category as stored on a movement record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "movement_category", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementCategory {
    Restock,
    Depletion,
    Adjustment,
    Transfer,
}

impl MovementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementCategory::Restock => "RESTOCK",
            MovementCategory::Depletion => "DEPLETION",
            MovementCategory::Adjustment => "ADJUSTMENT",
            MovementCategory::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for MovementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementCategory {
    type Err = RuleViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESTOCK" => Ok(MovementCategory::Restock),
            "DEPLETION" => Ok(MovementCategory::Depletion),
            "ADJUSTMENT" => Ok(MovementCategory::Adjustment),
            "TRANSFER" => Ok(MovementCategory::Transfer),
            other => Err(RuleViolation::input(
                "category",
                format!("unknown movement category '{}'", other),
            )),
        }
    }
}

/// Lifecycle of a transfer record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "transfer_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Confirmed => "CONFIRMED",
            TransferStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    /// Only a pending transfer may be confirmed or rejected
    pub fn ensure_pending(&self, action: &str) -> Result<(), RuleViolation> {
        if self.is_terminal() {
            return Err(RuleViolation::Conflict(format!(
                "Cannot {} a transfer that is already {}",
                action,
                self.as_str().to_lowercase()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested stock movement at a source store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockMovement {
    /// Add to the on-hand quantity, creating the position if needed
    Restock { quantity: Decimal },
    /// Remove from an existing position
    Depletion { quantity: Decimal },
    /// Overwrite the on-hand quantity
    Adjustment { quantity: Decimal },
    /// Deduct now, credit the destination on confirmation
    Transfer { quantity: Decimal, to_store_id: Uuid },
}

impl StockMovement {
    /// Build a movement from its category and raw parts
    pub fn new(
        category: MovementCategory,
        quantity: Decimal,
        from_store_id: Uuid,
        to_store_id: Option<Uuid>,
    ) -> Result<Self, RuleViolation> {
        if quantity < Decimal::ZERO {
            return Err(RuleViolation::input("quantity", "must not be negative"));
        }

        let movement = match category {
            MovementCategory::Restock => StockMovement::Restock { quantity },
            MovementCategory::Depletion => StockMovement::Depletion { quantity },
            MovementCategory::Adjustment => StockMovement::Adjustment { quantity },
            MovementCategory::Transfer => {
                let to_store_id = to_store_id.ok_or_else(|| {
                    RuleViolation::input("to_store_id", "is required for a transfer")
                })?;
                if to_store_id == from_store_id {
                    return Err(RuleViolation::input(
                        "to_store_id",
                        "must differ from the source store",
                    ));
                }
                StockMovement::Transfer {
                    quantity,
                    to_store_id,
                }
            }
        };

        Ok(movement)
    }

    pub fn category(&self) -> MovementCategory {
        match self {
            StockMovement::Restock { .. } => MovementCategory::Restock,
            StockMovement::Depletion { .. } => MovementCategory::Depletion,
            StockMovement::Adjustment { .. } => MovementCategory::Adjustment,
            StockMovement::Transfer { .. } => MovementCategory::Transfer,
        }
    }

    pub fn quantity(&self) -> Decimal {
        match *self {
            StockMovement::Restock { quantity }
            | StockMovement::Depletion { quantity }
            | StockMovement::Adjustment { quantity }
            | StockMovement::Transfer { quantity, .. } => quantity,
        }
    }

    pub fn destination(&self) -> Option<Uuid> {
        match *self {
            StockMovement::Transfer { to_store_id, .. } => Some(to_store_id),
            _ => None,
        }
    }

    /// Whether the movement may create a position that does not exist yet
    pub fn creates_position(&self) -> bool {
        matches!(
            self,
            StockMovement::Restock { .. } | StockMovement::Adjustment { .. }
        )
    }

    /// Source quantity after applying the movement to `current`
    ///
    /// `current` is `None` when no position exists for the triple.
    pub fn apply(&self, current: Option<Decimal>) -> Result<Decimal, RuleViolation> {
        match *self {
            StockMovement::Restock { quantity } => credit(current, quantity),
            StockMovement::Adjustment { quantity } => Ok(quantity),
            StockMovement::Depletion { quantity } | StockMovement::Transfer { quantity, .. } => {
                let available =
                    current.ok_or_else(|| RuleViolation::not_found("Item in store"))?;
                if available < quantity {
                    return Err(RuleViolation::InsufficientStock {
                        available,
                        requested: quantity,
                    });
                }
                Ok(available - quantity)
            }
        }
    }
}

/// Quantity after crediting `quantity` onto a possibly missing position
pub fn credit(current: Option<Decimal>, quantity: Decimal) -> Result<Decimal, RuleViolation> {
    current
        .unwrap_or(Decimal::ZERO)
        .checked_add(quantity)
        .ok_or_else(|| RuleViolation::input("quantity", "is too large"))
}

/// A received quantity may fall short of what was dispatched, never exceed it
pub fn validate_confirmed_quantity(
    confirmed: Decimal,
    initiated: Decimal,
) -> Result<(), RuleViolation> {
    if confirmed < Decimal::ZERO {
        return Err(RuleViolation::input("confirmed_qty", "must not be negative"));
    }
    if confirmed > initiated {
        return Err(RuleViolation::input(
            "confirmed_qty",
            format!(
                "cannot exceed the dispatched quantity of {}",
                initiated.normalize()
            ),
        ));
    }
    Ok(())
}

/// Length of a transfer id
pub const TRANSFER_ID_LENGTH: usize = 8;

const TRANSFER_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random human-shareable transfer id; uniqueness is checked by the caller
pub fn generate_transfer_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..TRANSFER_ID_LENGTH)
        .map(|_| TRANSFER_ID_ALPHABET[rng.gen_range(0..TRANSFER_ID_ALPHABET.len())] as char)
        .collect()
}

pub fn is_valid_transfer_id(id: &str) -> bool {
    id.len() == TRANSFER_ID_LENGTH
        && id
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// On-hand quantity for one (item, store, unit) triple
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryPosition {
    pub id: Uuid,
    pub item_id: Uuid,
    pub store_id: Uuid,
    pub unit_id: Uuid,
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of the movement log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MovementRecord {
    pub id: Uuid,
    pub item_id: Uuid,
    pub store_id: Uuid,
    pub to_store_id: Option<Uuid>,
    pub unit_id: Uuid,
    pub category: MovementCategory,
    pub quantity: Decimal,
    /// Dispatched quantity of a transfer; `quantity` becomes the received one
    pub initiated_quantity: Option<Decimal>,
    pub remaining_quantity: Decimal,
    pub source: Option<String>,
    pub description: Option<String>,
    pub recorded_by: Uuid,
    pub delivery_note_id: Option<Uuid>,
    pub evidence: Vec<String>,
    pub transfer_id: Option<String>,
    pub transfer_status: Option<TransferStatus>,
    pub extra_note: Option<String>,
    pub is_resolved: bool,
    pub resolve_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MovementRecord {
    /// Status of a transfer record; errors for non-transfer records
    pub fn transfer_state(&self) -> Result<TransferStatus, RuleViolation> {
        match (self.category, self.transfer_status) {
            (MovementCategory::Transfer, Some(status)) => Ok(status),
            _ => Err(RuleViolation::input(
                "transfer_id",
                "record is not a stock transfer",
            )),
        }
    }

    /// Quantity deducted from the source when the transfer was initiated
    pub fn deducted_quantity(&self) -> Decimal {
        self.initiated_quantity.unwrap_or(self.quantity)
    }

    /// Confirmed transfer whose received quantity differs from the dispatched one
    pub fn has_discrepancy(&self) -> bool {
        self.transfer_status == Some(TransferStatus::Confirmed)
            && self.initiated_quantity.is_some_and(|sent| sent != self.quantity)
    }
}
