//! HTTP handlers for the Back Office Ledger API

pub mod health;
pub mod project_payment;
pub mod project_sale;
pub mod stock_movement;

pub use health::health_check;
