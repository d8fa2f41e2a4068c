use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::Deserialize;

use avtale_core::{Actor, Appointment, AppointmentId, ClinicalOutcome, ProviderId, Reschedule};

use crate::auth::AuthSession;
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(book).get(list_own))
        .route("/appointments/{id}", get(get_one).put(reschedule))
        .route("/appointments/{id}/cancel", post(cancel))
        .route("/appointments/{id}/restore", post(restore))
        .route("/appointments/{id}/complete", post(complete))
}

#[derive(Deserialize)]
pub struct BookRequest {
    provider_id: u64,
    scheduled_at: NaiveDateTime,
    #[serde(default)]
    note: String,
}

async fn book(
    State(state): State<AppState>,
    session: AuthSession,
    Json(body): Json<BookRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let requester = session.requester()?;
    let appointment = state.engine.book(
        ProviderId(body.provider_id),
        requester,
        body.scheduled_at,
        body.note,
    )?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// The caller's appointments, newest first.
async fn list_own(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let appointments = match session.actor()? {
        Actor::Requester(id) => state.engine.list_for_requester(id)?,
        Actor::Provider(id) => state.engine.list_for_provider(id)?,
    };
    Ok(Json(appointments))
}

async fn get_one(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<u64>,
) -> Result<Json<Appointment>, ApiError> {
    let appointment = state.engine.appointment(AppointmentId(id), session.actor()?)?;
    Ok(Json(appointment))
}

#[derive(Deserialize)]
pub struct RescheduleRequest {
    provider_id: Option<u64>,
    scheduled_at: NaiveDateTime,
    note: Option<String>,
}

async fn reschedule(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<u64>,
    Json(body): Json<RescheduleRequest>,
) -> Result<Json<Appointment>, ApiError> {
    let change = Reschedule {
        provider: body.provider_id.map(ProviderId),
        scheduled_at: body.scheduled_at,
        note: body.note,
    };
    let appointment = state
        .engine
        .reschedule(AppointmentId(id), change, session.actor()?)?;
    Ok(Json(appointment))
}

async fn cancel(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<u64>,
) -> Result<Json<Appointment>, ApiError> {
    let appointment = state.engine.cancel(AppointmentId(id), session.actor()?)?;
    Ok(Json(appointment))
}

async fn restore(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<u64>,
) -> Result<Json<Appointment>, ApiError> {
    let appointment = state.engine.restore(AppointmentId(id), session.actor()?)?;
    Ok(Json(appointment))
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    diagnosis: String,
    prescription: Option<String>,
    notes: Option<String>,
}

async fn complete(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<u64>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<Appointment>, ApiError> {
    let outcome = ClinicalOutcome {
        diagnosis: body.diagnosis,
        prescription: body.prescription,
        notes: body.notes,
    };
    let appointment = state
        .engine
        .complete(AppointmentId(id), session.actor()?, outcome)?;
    Ok(Json(appointment))
}
