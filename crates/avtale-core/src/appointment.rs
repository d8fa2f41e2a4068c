use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ids::{Actor, AppointmentId, ProviderId, RequesterId};

/// Lifecycle status of an appointment.
///
/// `Booked` is the only live state; `Cancelled` can be restored by its
/// requester, `Completed` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Booked,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Whether an appointment in this status occupies its provider's slot.
    pub fn is_live(self) -> bool {
        matches!(self, AppointmentStatus::Booked)
    }
}

/// Human-readable booking label, e.g. `APT-20250520-1-000003`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingCode(String);

impl BookingCode {
    /// Derive the code from the booking date, the store-assigned id and the requester.
    ///
    /// The appointment id alone makes the code unique.
    pub fn derive(date: NaiveDate, id: AppointmentId, requester: RequesterId) -> Self {
        Self(format!(
            "APT-{}-{}-{:06}",
            date.format("%Y%m%d"),
            id.0,
            requester.0
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BookingCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Clinical outcome recorded by the provider when completing an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalOutcome {
    pub diagnosis: String,
    pub prescription: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub booking_code: BookingCode,
    pub provider: ProviderId,
    pub requester: RequesterId,
    /// Timezone-naive scheduled instant.
    pub scheduled_at: NaiveDateTime,
    pub note: String,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub outcome: Option<ClinicalOutcome>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Appointment {
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    pub fn is_owned_by(&self, actor: Actor) -> bool {
        match actor {
            Actor::Requester(id) => self.requester == id,
            Actor::Provider(id) => self.provider == id,
        }
    }

    /// Key of the slot this appointment occupies while live.
    pub fn slot(&self) -> (ProviderId, NaiveDateTime) {
        (self.provider, self.scheduled_at)
    }
}

/// Appointment fields supplied by the engine; the store assigns id and booking code.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub provider: ProviderId,
    pub requester: RequesterId,
    pub scheduled_at: NaiveDateTime,
    pub note: String,
    pub booked_at: NaiveDateTime,
}

impl NewAppointment {
    /// Materialize the appointment once the store has picked an id.
    pub fn into_appointment(self, id: AppointmentId) -> Appointment {
        Appointment {
            id,
            booking_code: BookingCode::derive(self.booked_at.date(), id, self.requester),
            provider: self.provider,
            requester: self.requester,
            scheduled_at: self.scheduled_at,
            note: self.note,
            status: AppointmentStatus::Booked,
            outcome: None,
            created_at: self.booked_at,
            updated_at: self.booked_at,
        }
    }
}
