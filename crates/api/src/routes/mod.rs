pub mod deals;
pub mod health;
pub mod notifications;
pub mod rate_limit;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(deals::router())
        .merge(notifications::router())
        .merge(rate_limit::router())
        .with_state(state)
}
