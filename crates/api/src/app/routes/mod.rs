use axum::{Router, routing::get};

pub mod accounts;
pub mod addresses;
pub mod common;
pub mod customers;
pub mod fiscal;
pub mod reports;
pub mod system;
pub mod vouchers;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/customers", customers::router())
        .nest("/addresses", addresses::router())
        .nest("/accounts", accounts::router())
        .nest("/fiscal-years", fiscal::router())
        .nest("/vouchers", vouchers::router())
        .nest("/reports", reports::router())
}
