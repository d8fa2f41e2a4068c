use chrono::NaiveDateTime;
use thiserror::Error;

use crate::appointment::AppointmentStatus;
use crate::ids::{AppointmentId, ProviderId};

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Note too long: {0} characters (max 1000)")]
    NoteTooLong(usize),

    #[error("Display name must not be empty")]
    EmptyName,

    #[error("Display name too long: {0} characters (max 128)")]
    NameTooLong(usize),

    #[error("Diagnosis must not be empty")]
    EmptyDiagnosis,
}

/// Errors surfaced by the scheduling engine and the appointment state machine.
#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Slot already booked: {provider} at {at}")]
    Conflict { provider: ProviderId, at: NaiveDateTime },

    #[error("Cannot book a time in the past: {0}")]
    PastTime(NaiveDateTime),

    #[error("Invalid transition for {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: AppointmentId,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for SchedulingError {
    /// The live-slot constraint is the authoritative conflict signal.
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::SlotTaken { provider, at } => SchedulingError::Conflict { provider, at },
            other => SchedulingError::Storage(other),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("Account {0} is already logged in elsewhere")]
    AlreadyActive(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Live booking already exists for {provider} at {at}")]
    SlotTaken { provider: ProviderId, at: NaiveDateTime },

    #[error("Database error: {0}")]
    Database(String),
}
