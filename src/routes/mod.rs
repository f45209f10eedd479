use axum::{routing::get, Router};

use crate::state::AppState;

pub mod health;
pub mod payment_schedules;
pub mod payments;
pub mod rentals;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(rentals::router())
        .merge(payment_schedules::router())
        .merge(payments::router())
}
