use tokio::sync::mpsc;

use avtale_core::{Notification, NotificationSink};

use crate::notifier::{deliver, Notifier};

/// Non-blocking hand-off from request handlers to the delivery worker.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationQueue {
    /// Create a queue and the worker that drains it into `notifier`.
    pub fn channel<N: Notifier>(notifier: N) -> (Self, NotificationWorker<N>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, NotificationWorker { rx, notifier })
    }
}

impl NotificationSink for NotificationQueue {
    fn submit(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            tracing::warn!(
                "Notification worker stopped, dropping {} for {}",
                e.0.kind(),
                e.0.appointment().id
            );
        }
    }
}

/// Counters from a worker run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: usize,
    pub failed: usize,
}

/// Drains the queue into a notifier, one message at a time.
pub struct NotificationWorker<N: Notifier> {
    rx: mpsc::UnboundedReceiver<Notification>,
    notifier: N,
}

impl<N: Notifier> NotificationWorker<N> {
    /// Run until every queue handle has been dropped.
    pub async fn run(mut self) -> DeliveryStats {
        let mut stats = DeliveryStats::default();

        while let Some(notification) = self.rx.recv().await {
            if deliver(&self.notifier, &notification).await {
                stats.delivered += 1;
            } else {
                stats.failed += 1;
                // Not retried
                tracing::warn!(
                    "Failed to deliver {} notification for {}",
                    notification.kind(),
                    notification.appointment().id
                );
            }
        }

        tracing::info!(
            "Notification worker stopped: {} delivered, {} failed",
            stats.delivered,
            stats.failed
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avtale_core::{Appointment, AppointmentId, NewAppointment, ProviderId, RequesterId};
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockNotifier {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Notifier for MockNotifier {
        async fn notify_booked(&self, appointment: &Appointment) -> bool {
            self.seen
                .lock()
                .unwrap()
                .push(format!("booked {}", appointment.id));
            true
        }

        async fn notify_rescheduled(&self, _old: &Appointment, new: &Appointment) -> bool {
            self.seen
                .lock()
                .unwrap()
                .push(format!("rescheduled {}", new.id));
            true
        }

        async fn notify_cancelled(&self, appointment: &Appointment) -> bool {
            self.seen
                .lock()
                .unwrap()
                .push(format!("cancelled {}", appointment.id));
            // Mail server down
            false
        }
    }

    fn appointment(id: u64, hour: u32) -> Appointment {
        let at = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        NewAppointment {
            provider: ProviderId(1),
            requester: RequesterId(2),
            scheduled_at: at,
            note: String::new(),
            booked_at: at,
        }
        .into_appointment(AppointmentId(id))
    }

    #[tokio::test]
    async fn test_worker_delivers_in_order() {
        let notifier = MockNotifier::default();
        let seen = notifier.seen.clone();
        let (queue, worker) = NotificationQueue::channel(notifier);

        queue.submit(Notification::Booked {
            appointment: appointment(1, 10),
        });
        queue.submit(Notification::Rescheduled {
            old: appointment(1, 10),
            new: appointment(1, 11),
        });
        queue.submit(Notification::Cancelled {
            appointment: appointment(1, 11),
        });
        drop(queue);

        let stats = worker.run().await;

        assert_eq!(
            stats,
            DeliveryStats {
                delivered: 2,
                failed: 1
            }
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "booked appointment-1".to_string(),
                "rescheduled appointment-1".to_string(),
                "cancelled appointment-1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_submit_after_worker_stopped_is_dropped() {
        let (queue, worker) = NotificationQueue::channel(MockNotifier::default());
        drop(worker);

        // Must not panic or block
        queue.submit(Notification::Booked {
            appointment: appointment(1, 10),
        });
    }
}
