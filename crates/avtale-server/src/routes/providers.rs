use axum::{extract::State, routing::get, Json, Router};

use avtale_core::Provider;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/providers", get(list_approved))
}

/// Providers that can be booked.
async fn list_approved(State(state): State<AppState>) -> Result<Json<Vec<Provider>>, ApiError> {
    Ok(Json(state.engine.approved_providers()?))
}
