//! Route definitions for the Back Office Ledger

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes; every route requires a bearer token
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/stock-movements", stock_movement_routes())
        .nest("/stores", store_routes())
        .route(
            "/positions",
            get(handlers::stock_movement::get_position),
        )
        .nest("/project-sales", project_sale_routes())
        .nest("/project-payments", project_payment_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Inventory ledger routes
fn stock_movement_routes() -> Router<AppState> {
    use crate::handlers::stock_movement as h;

    Router::new()
        .route("/", get(h::list_movements).post(h::record_movement))
        .route("/:record_id", get(h::get_movement))
        .route("/:record_id/resolve", post(h::resolve_conflict))
        .route("/transfers/:transfer_id", get(h::get_transfer))
        .route("/transfers/:transfer_id/confirm", post(h::confirm_transfer))
        .route("/transfers/:transfer_id/reject", post(h::reject_transfer))
}

/// Per-store inventory views
fn store_routes() -> Router<AppState> {
    use crate::handlers::stock_movement as h;

    Router::new()
        .route("/:store_id/positions", get(h::store_positions))
        .route("/:store_id/pending-transfers", get(h::list_pending_transfers))
}

/// Installment sale routes
fn project_sale_routes() -> Router<AppState> {
    use crate::handlers::{project_payment as payments, project_sale as sales};

    Router::new()
        .route("/", get(sales::list_sales).post(sales::create_sale))
        .route("/summary", get(sales::sales_summary))
        .route(
            "/:sale_id",
            get(sales::get_sale)
                .put(sales::update_sale)
                .delete(sales::delete_sale),
        )
        .route("/:sale_id/schedule", get(sales::payment_schedule))
        .route(
            "/:sale_id/payments",
            get(payments::payments_by_sale).post(payments::add_payment),
        )
        .route("/:sale_id/payments/summary", get(payments::payment_summary))
}

/// Payment routes
fn project_payment_routes() -> Router<AppState> {
    use crate::handlers::project_payment as h;

    Router::new().route(
        "/:payment_id",
        get(h::get_payment)
            .put(h::modify_payment)
            .delete(h::delete_payment),
    )
}
