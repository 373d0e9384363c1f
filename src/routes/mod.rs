use axum::{routing::get, Router};

use crate::state::AppState;

pub mod accounts;
pub mod health;
pub mod invoices;
pub mod payments;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(accounts::router())
        .merge(invoices::router())
        .merge(payments::router())
}
