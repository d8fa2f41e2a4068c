use std::future::Future;

use avtale_core::{Appointment, Notification};

/// Delivers appointment notifications to the outside world.
///
/// Every method reports success as a `bool`. Failures are the notifier's
/// to log; they never reach the code that triggered the notification.
pub trait Notifier: Send + Sync {
    fn notify_booked(&self, appointment: &Appointment) -> impl Future<Output = bool> + Send;

    fn notify_rescheduled(
        &self,
        old: &Appointment,
        new: &Appointment,
    ) -> impl Future<Output = bool> + Send;

    fn notify_cancelled(&self, appointment: &Appointment) -> impl Future<Output = bool> + Send;
}

/// Dispatch one queued notification to the matching notifier method.
pub async fn deliver<N: Notifier>(notifier: &N, notification: &Notification) -> bool {
    match notification {
        Notification::Booked { appointment } => notifier.notify_booked(appointment).await,
        Notification::Rescheduled { old, new } => notifier.notify_rescheduled(old, new).await,
        Notification::Cancelled { appointment } => notifier.notify_cancelled(appointment).await,
    }
}

/// Notifier that writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify_booked(&self, appointment: &Appointment) -> bool {
        tracing::info!(
            "Booking confirmed: {} with {} at {}",
            appointment.booking_code,
            appointment.provider,
            appointment.scheduled_at
        );
        true
    }

    async fn notify_rescheduled(&self, old: &Appointment, new: &Appointment) -> bool {
        tracing::info!(
            "Booking {} moved from {} at {} to {} at {}",
            new.booking_code,
            old.provider,
            old.scheduled_at,
            new.provider,
            new.scheduled_at
        );
        true
    }

    async fn notify_cancelled(&self, appointment: &Appointment) -> bool {
        tracing::info!("Booking cancelled: {}", appointment.booking_code);
        true
    }
}
