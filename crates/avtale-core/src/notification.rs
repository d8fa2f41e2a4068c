use serde::{Deserialize, Serialize};

use crate::appointment::Appointment;

/// Outbound message about a committed change to an appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    Booked { appointment: Appointment },
    Rescheduled { old: Appointment, new: Appointment },
    Cancelled { appointment: Appointment },
}

impl Notification {
    /// The appointment as it stands after the change.
    pub fn appointment(&self) -> &Appointment {
        match self {
            Notification::Booked { appointment } => appointment,
            Notification::Rescheduled { new, .. } => new,
            Notification::Cancelled { appointment } => appointment,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Booked { .. } => "booked",
            Notification::Rescheduled { .. } => "rescheduled",
            Notification::Cancelled { .. } => "cancelled",
        }
    }
}

/// Fire-and-forget hand-off for notifications.
///
/// `submit` is called after the change has committed and must not block.
/// Delivery failures never reach the caller.
pub trait NotificationSink: Send + Sync {
    fn submit(&self, notification: Notification);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl NotificationSink for DiscardSink {
    fn submit(&self, notification: Notification) {
        tracing::trace!(
            kind = notification.kind(),
            appointment = %notification.appointment().id,
            "Discarding notification"
        );
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingSink;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps every submitted notification, for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        received: Mutex<Vec<Notification>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn received(&self) -> Vec<Notification> {
            self.received.lock().unwrap().clone()
        }

        pub fn kinds(&self) -> Vec<&'static str> {
            self.received
                .lock()
                .unwrap()
                .iter()
                .map(Notification::kind)
                .collect()
        }
    }

    impl NotificationSink for RecordingSink {
        fn submit(&self, notification: Notification) {
            self.received.lock().unwrap().push(notification);
        }
    }
}
