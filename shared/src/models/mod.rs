//! Domain models for the inventory and installment sale ledgers

mod sale;
mod stock;

pub use sale::*;
pub use stock::*;
