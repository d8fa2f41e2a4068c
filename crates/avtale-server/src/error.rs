use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use avtale_core::{SchedulingError, SessionError, StorageError, ValidationError};

/// Error returned by HTTP handlers.
///
/// Storage failures reach the client as a generic 500; the detail is logged.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many attempts, retry in {}s", .0.as_secs().max(1))]
    RateLimited(Duration),

    #[error("Internal server error")]
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Duplicate(key) => ApiError::Conflict(format!("{} already exists", key)),
            StorageError::NotFound(key) => ApiError::NotFound(key),
            other => ApiError::Storage(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Scheduling(e) => match e {
                SchedulingError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                SchedulingError::Conflict { .. } => (StatusCode::CONFLICT, "SLOT_TAKEN"),
                SchedulingError::PastTime(_) => (StatusCode::UNPROCESSABLE_ENTITY, "PAST_TIME"),
                SchedulingError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION")
                }
                SchedulingError::AccessDenied(_) => (StatusCode::FORBIDDEN, "ACCESS_DENIED"),
                SchedulingError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
                SchedulingError::Storage(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            ApiError::Session(SessionError::AlreadyActive(_)) => {
                (StatusCode::CONFLICT, "ALREADY_ACTIVE")
            }
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            ApiError::Storage(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            ApiError::InvalidCredentials | ApiError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED")
            }
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response();

        if let ApiError::RateLimited(wait) = &self {
            if let Ok(value) = HeaderValue::from_str(&wait.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avtale_core::{AppointmentId, AppointmentStatus, ProviderId};
    use chrono::NaiveDate;

    fn status(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_scheduling_error_statuses() {
        let at = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();

        assert_eq!(
            status(SchedulingError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(SchedulingError::Conflict {
                provider: ProviderId(1),
                at
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(SchedulingError::PastTime(at)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(SchedulingError::InvalidTransition {
                id: AppointmentId(1),
                from: AppointmentStatus::Completed,
                to: AppointmentStatus::Cancelled,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(SchedulingError::AccessDenied("no".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(SchedulingError::Validation(ValidationError::EmptyDiagnosis)),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_storage_errors() {
        assert_eq!(
            status(StorageError::Database("disk on fire".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(StorageError::Duplicate("kari".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_session_and_auth_statuses() {
        assert_eq!(
            status(SessionError::AlreadyActive("kari".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(status(ApiError::InvalidCredentials), StatusCode::UNAUTHORIZED);

        let response = ApiError::RateLimited(Duration::from_secs(30)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }
}
