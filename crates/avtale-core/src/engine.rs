use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::appointment::{Appointment, AppointmentStatus, NewAppointment};
use crate::clock::Clock;
use crate::error::SchedulingError;
use crate::ids::{Actor, AppointmentId, ProviderId, RequesterId};
use crate::notification::{Notification, NotificationSink};
use crate::party::Provider;
use crate::storage::{AppointmentFilter, Snapshot, Store};
use crate::validation::Validator;

/// Books and edits appointments so that no two live bookings share a
/// provider and instant.
///
/// Every mutating call runs as one atomic unit against the store. The
/// in-engine slot lookup is a fast path; the store's live-slot constraint
/// is what makes concurrent commits safe.
pub struct SchedulingEngine<S: Store> {
    pub(crate) store: Arc<S>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sink: Arc<dyn NotificationSink>,
}

/// Fields that may change when an appointment is rescheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct Reschedule {
    /// New provider; `None` keeps the current one.
    pub provider: Option<ProviderId>,
    pub scheduled_at: NaiveDateTime,
    /// New note; `None` keeps the current one.
    pub note: Option<String>,
}

impl<S: Store> SchedulingEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, clock, sink }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Book `provider` for `requester` at `at`.
    pub fn book(
        &self,
        provider: ProviderId,
        requester: RequesterId,
        at: NaiveDateTime,
        note: impl Into<String>,
    ) -> Result<Appointment, SchedulingError> {
        let note = note.into();
        Validator::validate_note(&note)?;

        let now = self.clock.now();
        if at < now {
            return Err(SchedulingError::PastTime(at));
        }

        let appointment = self.store.run_atomic(|tx| -> Result<Appointment, SchedulingError> {
            require_approved_provider(&*tx, provider)?;
            if tx.requester(requester)?.is_none() {
                return Err(SchedulingError::NotFound(requester.to_string()));
            }
            ensure_slot_free(&*tx, provider, at, None)?;

            let appointment = tx.insert_appointment(NewAppointment {
                provider,
                requester,
                scheduled_at: at,
                note,
                booked_at: now,
            })?;
            Ok(appointment)
        });

        let appointment = match appointment {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!("Booking {} at {} for {} failed: {}", provider, at, requester, e);
                return Err(e);
            }
        };

        tracing::info!(
            "Booked {} ({}) with {} at {}",
            appointment.id,
            appointment.booking_code,
            provider,
            at
        );
        self.sink.submit(Notification::Booked {
            appointment: appointment.clone(),
        });
        Ok(appointment)
    }

    /// Move a live appointment to a new instant, and for requesters
    /// optionally to another provider. The row is updated in place.
    pub fn reschedule(
        &self,
        id: AppointmentId,
        change: Reschedule,
        actor: Actor,
    ) -> Result<Appointment, SchedulingError> {
        if let Some(note) = &change.note {
            Validator::validate_note(note)?;
        }

        let now = self.clock.now();
        if change.scheduled_at < now {
            return Err(SchedulingError::PastTime(change.scheduled_at));
        }

        let (old, new) = self.store.run_atomic(|tx| -> Result<_, SchedulingError> {
            let current = owned_appointment(&*tx, id, actor)?;
            if current.status != AppointmentStatus::Booked {
                return Err(SchedulingError::InvalidTransition {
                    id,
                    from: current.status,
                    to: AppointmentStatus::Booked,
                });
            }

            let target = change.provider.unwrap_or(current.provider);
            if let Actor::Provider(own) = actor {
                if target != own {
                    return Err(SchedulingError::AccessDenied(format!(
                        "{} cannot move {} to {}",
                        actor, id, target
                    )));
                }
            }
            require_approved_provider(&*tx, target)?;
            ensure_slot_free(&*tx, target, change.scheduled_at, Some(id))?;

            let mut updated = current.clone();
            updated.provider = target;
            updated.scheduled_at = change.scheduled_at;
            if let Some(note) = change.note {
                updated.note = note;
            }
            updated.status = AppointmentStatus::Booked;
            updated.updated_at = now;
            tx.update_appointment(&updated)?;

            Ok((current, updated))
        })?;

        if old.slot() != new.slot() {
            tracing::info!(
                "Rescheduled {} from {} at {} to {} at {}",
                id,
                old.provider,
                old.scheduled_at,
                new.provider,
                new.scheduled_at
            );
            self.sink.submit(Notification::Rescheduled {
                old,
                new: new.clone(),
            });
        }
        Ok(new)
    }

    /// All appointments of a provider, newest first.
    pub fn list_for_provider(
        &self,
        provider: ProviderId,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.store
            .snapshot(|s| Ok(s.find_appointments(&AppointmentFilter::for_provider(provider))?))
    }

    /// All appointments of a requester, newest first.
    pub fn list_for_requester(
        &self,
        requester: RequesterId,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.store
            .snapshot(|s| Ok(s.find_appointments(&AppointmentFilter::for_requester(requester))?))
    }

    /// A single appointment, visible only to its provider and requester.
    pub fn appointment(
        &self,
        id: AppointmentId,
        actor: Actor,
    ) -> Result<Appointment, SchedulingError> {
        self.store.snapshot(|s| owned_appointment(s, id, actor))
    }

    /// Providers that can currently be booked.
    pub fn approved_providers(&self) -> Result<Vec<Provider>, SchedulingError> {
        self.store.snapshot(|s| {
            Ok(s.providers()?
                .into_iter()
                .filter(Provider::is_approved)
                .collect())
        })
    }
}

/// Load an appointment and check that `actor` owns it.
pub(crate) fn owned_appointment<T: Snapshot + ?Sized>(
    tx: &T,
    id: AppointmentId,
    actor: Actor,
) -> Result<Appointment, SchedulingError> {
    let appointment = tx
        .appointment(id)?
        .ok_or_else(|| SchedulingError::NotFound(id.to_string()))?;
    if !appointment.is_owned_by(actor) {
        return Err(SchedulingError::AccessDenied(format!(
            "{} does not own {}",
            actor, id
        )));
    }
    Ok(appointment)
}

pub(crate) fn require_approved_provider<T: Snapshot + ?Sized>(
    tx: &T,
    id: ProviderId,
) -> Result<Provider, SchedulingError> {
    let provider = tx
        .provider(id)?
        .ok_or_else(|| SchedulingError::NotFound(id.to_string()))?;
    if !provider.is_approved() {
        return Err(SchedulingError::NotFound(format!("{} (not approved)", id)));
    }
    Ok(provider)
}

/// Fail with `Conflict` if a live booking other than `exclude` holds the slot.
pub(crate) fn ensure_slot_free<T: Snapshot + ?Sized>(
    tx: &T,
    provider: ProviderId,
    at: NaiveDateTime,
    exclude: Option<AppointmentId>,
) -> Result<(), SchedulingError> {
    let mut filter = AppointmentFilter::live_slot(provider, at);
    filter.exclude = exclude;
    if !tx.find_appointments(&filter)?.is_empty() {
        return Err(SchedulingError::Conflict { provider, at });
    }
    Ok(())
}
