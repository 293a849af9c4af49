//! Read-only lookups against the reference tables the ledgers depend on
//!
//! Stores, items, units, employees, clients and projects are maintained
//! elsewhere; the ledgers only check that referenced rows exist and that an
//! employee may operate in a store.

use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::RuleViolation;

/// A reference table the ledgers look rows up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Store,
    Item,
    Unit,
    Employee,
    Client,
    Project,
}

impl Reference {
    fn table(&self) -> &'static str {
        match self {
            Reference::Store => "stores",
            Reference::Item => "items",
            Reference::Unit => "units",
            Reference::Employee => "employees",
            Reference::Client => "clients",
            Reference::Project => "projects",
        }
    }

    /// Resource name used in not-found errors
    pub fn label(&self) -> &'static str {
        match self {
            Reference::Store => "Store",
            Reference::Item => "Stock item",
            Reference::Unit => "Unit",
            Reference::Employee => "Employee",
            Reference::Client => "Client",
            Reference::Project => "Project",
        }
    }
}

/// Store row with the employees allowed to move its stock
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    pub authorized_personnel: Vec<Uuid>,
}

impl Store {
    /// Employees outside the store's personnel list may not move its stock
    pub fn authorize(&self, employee_id: Uuid) -> Result<(), RuleViolation> {
        if !self.authorized_personnel.contains(&employee_id) {
            return Err(RuleViolation::Unauthorized(format!(
                "Employee is not authorized to operate in store {}",
                self.name
            )));
        }
        Ok(())
    }
}

/// Fail with NotFound unless `id` exists in the reference table
pub async fn require<'e, E>(executor: E, reference: Reference, id: Uuid) -> AppResult<()>
where
    E: PgExecutor<'e>,
{
    let query = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", reference.table());
    let exists = sqlx::query_scalar::<_, bool>(&query)
        .bind(id)
        .fetch_one(executor)
        .await?;

    if !exists {
        return Err(AppError::NotFound(reference.label().to_string()));
    }

    Ok(())
}

/// Load a store with its authorized personnel
pub async fn fetch_store<'e, E>(executor: E, store_id: Uuid) -> AppResult<Store>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Store>(
        "SELECT id, name, authorized_personnel FROM stores WHERE id = $1",
    )
    .bind(store_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound(Reference::Store.label().to_string()))
}
