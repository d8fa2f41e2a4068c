use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use avtale_core::{
    Account, Actor, NewProvider, NewRequester, ProfileDraft, Role, SessionHandle, Snapshot,
    Store, UnitOfWork, Validator,
};

use crate::auth::{hash_password, verify_password, AuthSession};
use crate::error::ApiError;
use crate::state::AppState;

const MIN_PASSWORD_CHARS: usize = 8;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(sign_up))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

#[derive(Deserialize)]
pub struct SignUpRequest {
    username: String,
    password: String,
    role: Role,
    display_name: String,
    contact: Option<String>,
    specialization: Option<String>,
}

#[derive(Serialize)]
pub struct SignUpResponse {
    username: String,
    role: Role,
    verified: bool,
}

async fn sign_up(
    State(state): State<AppState>,
    Json(body): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), ApiError> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("username must not be empty".to_string()));
    }
    if body.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }
    if body.role == Role::Admin {
        return Err(ApiError::Forbidden(
            "administrator accounts cannot be self-registered".to_string(),
        ));
    }
    Validator::validate_display_name(&body.display_name)?;

    let account = Account::new(username, hash_password(&body.password)?, body.role).with_draft(
        ProfileDraft {
            display_name: body.display_name.trim().to_string(),
            contact: body.contact,
            specialization: body.specialization,
        },
    );
    state
        .store
        .run_atomic(|tx: &mut dyn UnitOfWork| tx.insert_account(&account))?;

    tracing::info!("Registered {:?} account {}", account.role, account.username);
    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            username: account.username,
            role: account.role,
            verified: false,
        }),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    role: Role,
    profile_id: Option<u64>,
}

async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    state
        .login_limiter
        .check(addr.ip())
        .map_err(ApiError::RateLimited)?;

    let account = state
        .store
        .snapshot(|s: &dyn Snapshot| s.account(&body.username))?;
    let account = match account {
        Some(account) if verify_password(&body.password, &account.credential_hash) => account,
        _ => {
            tracing::warn!("Failed login for {} from {}", body.username, addr.ip());
            return Err(ApiError::InvalidCredentials);
        }
    };

    if account.role != Role::Admin && !account.verified {
        return Err(ApiError::Forbidden("account is not verified yet".to_string()));
    }

    let account = ensure_profile(&state, account)?;
    if let Some(Actor::Provider(id)) = account.actor() {
        let approved = state
            .store
            .snapshot(|s: &dyn Snapshot| s.provider(id))?
            .is_some_and(|p| p.is_approved());
        if !approved {
            return Err(ApiError::Forbidden(
                "provider account is awaiting approval".to_string(),
            ));
        }
    }

    // The session must be live before it is registered, or a concurrent
    // login would see a dead handle and replace it.
    let handle = SessionHandle::generate();
    state
        .sessions
        .insert(&handle, &account.username, account.role, account.actor());
    if let Err(e) = state.registry.try_acquire(&account.username, handle.clone()) {
        state.sessions.remove(handle.as_str());
        return Err(e.into());
    }

    tracing::info!("{} signed in", account.username);
    Ok(Json(LoginResponse {
        token: handle.to_string(),
        role: account.role,
        profile_id: account.profile_id,
    }))
}

/// Turn the sign-up draft into a Provider or Requester on first sign-in.
fn ensure_profile(state: &AppState, account: Account) -> Result<Account, ApiError> {
    if account.role == Role::Admin || account.profile_id.is_some() {
        return Ok(account);
    }

    let linked = state.store.run_atomic(|tx| -> Result<Account, ApiError> {
        // Re-read inside the unit; a parallel sign-in may have linked it already
        let mut account = tx
            .account(&account.username)?
            .ok_or(ApiError::InvalidCredentials)?;
        if account.profile_id.is_some() {
            return Ok(account);
        }

        let draft = account.draft.clone().unwrap_or_else(|| ProfileDraft {
            display_name: account.username.clone(),
            contact: None,
            specialization: None,
        });
        let id = match account.role {
            Role::Provider => {
                tx.insert_provider(NewProvider {
                    display_name: draft.display_name,
                    specialization: draft.specialization.unwrap_or_default(),
                })?
                .id
                .0
            }
            Role::Requester => {
                tx.insert_requester(NewRequester {
                    display_name: draft.display_name,
                    contact: draft.contact,
                })?
                .id
                .0
            }
            Role::Admin => return Ok(account),
        };
        account.link_profile(id);
        tx.update_account(&account)?;
        Ok(account)
    })?;

    tracing::info!(
        "Created {:?} profile {:?} for {}",
        linked.role,
        linked.profile_id,
        linked.username
    );
    Ok(linked)
}

async fn logout(State(state): State<AppState>, session: AuthSession) -> StatusCode {
    state.sessions.remove(&session.token);
    state.registry.release(&session.info.username);
    tracing::info!("{} signed out", session.info.username);
    StatusCode::NO_CONTENT
}
