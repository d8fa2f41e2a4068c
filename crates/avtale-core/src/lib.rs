//! Avtale Core - Domain models, scheduling rules, and session tracking.
//!
//! This crate holds the appointment scheduling engine, the appointment
//! state machine, and the single-session registry. Persistence is behind
//! the `Store` trait; it has no dependencies on other Avtale crates.

pub mod appointment;
pub mod clock;
pub mod engine;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod notification;
pub mod party;
pub mod session;
pub mod storage;
pub mod validation;

// Re-exports for convenience
pub use appointment::{Appointment, AppointmentStatus, BookingCode, ClinicalOutcome, NewAppointment};
pub use clock::{Clock, SystemClock};
pub use engine::{Reschedule, SchedulingEngine};
pub use error::{SchedulingError, SessionError, StorageError, ValidationError};
pub use ids::{Actor, AppointmentId, ProviderId, RequesterId};
pub use lifecycle::Transition;
pub use notification::{DiscardSink, Notification, NotificationSink};
pub use party::{
    Account, Approval, NewProvider, NewRequester, ProfileDraft, Provider, Requester, Role,
};
pub use session::{Acquired, SessionHandle, SessionProbe, SessionRegistry};
pub use storage::{AppointmentFilter, Snapshot, Store, UnitOfWork};
pub use validation::Validator;

#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
#[cfg(any(test, feature = "test-utils"))]
pub use notification::RecordingSink;
#[cfg(any(test, feature = "test-utils"))]
pub use storage::memory::InMemoryStore;
