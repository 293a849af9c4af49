//! Ledger services for the Back Office Ledger

pub mod directory;
pub mod project_payment;
pub mod project_sale;
pub mod stock_movement;

pub use project_payment::ProjectPaymentService;
pub use project_sale::ProjectSaleService;
pub use stock_movement::StockMovementService;
