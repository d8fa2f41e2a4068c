use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use avtale_core::{Clock, Provider, ProviderId, Role, Snapshot, Store, UnitOfWork};

use crate::auth::AuthSession;
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/providers", get(list_providers))
        .route("/admin/accounts/{username}/verify", post(verify_account))
        .route("/admin/providers/{id}/approve", post(approve_provider))
        .route("/admin/providers/{id}/reject", post(reject_provider))
}

async fn list_providers(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<Vec<Provider>>, ApiError> {
    session.require_admin()?;
    let providers = state.store.snapshot(|s: &dyn Snapshot| s.providers())?;
    Ok(Json(providers))
}

#[derive(Serialize)]
pub struct AccountStatus {
    username: String,
    role: Role,
    verified: bool,
}

async fn verify_account(
    State(state): State<AppState>,
    session: AuthSession,
    Path(username): Path<String>,
) -> Result<Json<AccountStatus>, ApiError> {
    session.require_admin()?;

    let account = state.store.run_atomic(|tx: &mut dyn UnitOfWork| {
        let mut account = tx
            .account(&username)?
            .ok_or_else(|| ApiError::NotFound(format!("account {}", username)))?;
        account.verified = true;
        tx.update_account(&account)?;
        Ok::<_, ApiError>(account)
    })?;

    tracing::info!("{} verified account {}", session.info.username, username);
    Ok(Json(AccountStatus {
        username: account.username,
        role: account.role,
        verified: account.verified,
    }))
}

async fn approve_provider(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<u64>,
) -> Result<Json<Provider>, ApiError> {
    set_approval(&state, &session, ProviderId(id), true)
}

async fn reject_provider(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<u64>,
) -> Result<Json<Provider>, ApiError> {
    set_approval(&state, &session, ProviderId(id), false)
}

fn set_approval(
    state: &AppState,
    session: &AuthSession,
    id: ProviderId,
    approve: bool,
) -> Result<Json<Provider>, ApiError> {
    session.require_admin()?;
    let now = state.clock.now();

    let provider = state.store.run_atomic(|tx: &mut dyn UnitOfWork| {
        let mut provider = tx
            .provider(id)?
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        if approve {
            provider.approve(now);
        } else {
            provider.reject(now);
        }
        tx.update_provider(&provider)?;
        Ok::<_, ApiError>(provider)
    })?;

    tracing::info!(
        "{} set {} to {:?}",
        session.info.username,
        id,
        provider.approval
    );
    Ok(Json(provider))
}
