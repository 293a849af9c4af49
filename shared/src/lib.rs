//! Shared types and ledger rules for the Back Office Ledger
//!
//! This crate holds the domain model of the inventory and installment sale
//! ledgers together with the pure rules the backend applies inside its
//! database transactions. Nothing here performs I/O.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
