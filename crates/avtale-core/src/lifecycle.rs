use crate::appointment::{Appointment, AppointmentStatus, ClinicalOutcome};
use crate::engine::{
    ensure_slot_free, owned_appointment, require_approved_provider, SchedulingEngine,
};
use crate::error::SchedulingError;
use crate::ids::{Actor, AppointmentId};
use crate::notification::Notification;
use crate::storage::Store;
use crate::validation::Validator;

impl AppointmentStatus {
    /// Allowed status edges. `Completed` is terminal.
    pub fn can_transition(self, to: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, to),
            (Booked, Cancelled) | (Cancelled, Booked) | (Booked, Completed)
        )
    }
}

/// A status change requested by a party to the appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Cancel,
    Restore,
    Complete,
}

impl Transition {
    pub fn target(self) -> AppointmentStatus {
        match self {
            Transition::Cancel => AppointmentStatus::Cancelled,
            Transition::Restore => AppointmentStatus::Booked,
            Transition::Complete => AppointmentStatus::Completed,
        }
    }

    /// Either side may cancel; only the requester restores and only the
    /// provider completes.
    pub fn permits(self, actor: Actor) -> bool {
        matches!(
            (self, actor),
            (Transition::Cancel, _)
                | (Transition::Restore, Actor::Requester(_))
                | (Transition::Complete, Actor::Provider(_))
        )
    }
}

impl<S: Store> SchedulingEngine<S> {
    /// Cancel a booked appointment, freeing its slot.
    pub fn cancel(&self, id: AppointmentId, actor: Actor) -> Result<Appointment, SchedulingError> {
        let appointment = self.apply(id, actor, Transition::Cancel, None)?;
        self.sink.submit(Notification::Cancelled {
            appointment: appointment.clone(),
        });
        Ok(appointment)
    }

    /// Re-book a cancelled appointment at its original slot, if still free.
    pub fn restore(&self, id: AppointmentId, actor: Actor) -> Result<Appointment, SchedulingError> {
        let appointment = self.apply(id, actor, Transition::Restore, None)?;
        self.sink.submit(Notification::Booked {
            appointment: appointment.clone(),
        });
        Ok(appointment)
    }

    /// Mark a booked appointment completed and attach the clinical outcome.
    pub fn complete(
        &self,
        id: AppointmentId,
        actor: Actor,
        outcome: ClinicalOutcome,
    ) -> Result<Appointment, SchedulingError> {
        Validator::validate_outcome(&outcome)?;
        self.apply(id, actor, Transition::Complete, Some(outcome))
    }

    fn apply(
        &self,
        id: AppointmentId,
        actor: Actor,
        transition: Transition,
        outcome: Option<ClinicalOutcome>,
    ) -> Result<Appointment, SchedulingError> {
        let now = self.clock.now();

        let result = self.store.run_atomic(|tx| -> Result<Appointment, SchedulingError> {
            let mut appointment = owned_appointment(&*tx, id, actor)?;

            let to = transition.target();
            if !transition.permits(actor) || !appointment.status.can_transition(to) {
                return Err(SchedulingError::InvalidTransition {
                    id,
                    from: appointment.status,
                    to,
                });
            }
            // Going live again is held to the same guards as a new booking
            if to.is_live() {
                if appointment.scheduled_at < now {
                    return Err(SchedulingError::PastTime(appointment.scheduled_at));
                }
                require_approved_provider(&*tx, appointment.provider)?;
                ensure_slot_free(&*tx, appointment.provider, appointment.scheduled_at, Some(id))?;
            }

            appointment.status = to;
            appointment.updated_at = now;
            if outcome.is_some() {
                appointment.outcome = outcome;
            }
            tx.update_appointment(&appointment)?;
            Ok(appointment)
        });

        match &result {
            Ok(a) => tracing::info!("{:?} {} by {}: now {:?}", transition, id, actor, a.status),
            Err(e) => tracing::warn!("{:?} {} by {} failed: {}", transition, id, actor, e),
        }
        result
    }
}
