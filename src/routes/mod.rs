use axum::{routing::get, Router};

use crate::state::AppState;

pub mod health;
pub mod rent_reminders;
pub mod rent_units;
pub mod tracking;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(rent_reminders::router())
        .merge(rent_units::router())
        .merge(tracking::router())
}

/// API routes nested under the configured prefix, with state applied.
pub fn app_router(state: AppState) -> Router {
    let prefix = state.config.api_prefix.clone();
    Router::new().nest(&prefix, v1_router()).with_state(state)
}
