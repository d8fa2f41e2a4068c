pub mod accounts;
pub mod admin;
pub mod appointments;
pub mod health;
pub mod providers;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(accounts::routes())
        .merge(admin::routes())
        .merge(providers::routes())
        .merge(appointments::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
