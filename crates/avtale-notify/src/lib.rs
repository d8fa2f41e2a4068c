//! Avtale Notify - Best-effort delivery of appointment notifications.

pub mod notifier;
pub mod queue;
pub mod webhook;

pub use notifier::{deliver, LogNotifier, Notifier};
pub use queue::{DeliveryStats, NotificationQueue, NotificationWorker};
pub use webhook::{WebhookBody, WebhookNotifier};
