use std::time::Duration;

use serde::Serialize;

use avtale_core::Appointment;

use crate::notifier::Notifier;

/// JSON body posted to the webhook.
#[derive(Debug, Serialize)]
pub struct WebhookBody<'a> {
    pub event: &'static str,
    pub appointment: &'a Appointment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<&'a Appointment>,
}

/// Notifier that POSTs each notification as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

/// Upper bound on one webhook delivery, connect to last body byte.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// A delivery that takes longer than `timeout` counts as failed.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post(&self, body: WebhookBody<'_>) -> bool {
        let response = match self.client.post(&self.url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Webhook {} for {} failed: {}", body.event, body.appointment.id, e);
                return false;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                "Webhook {} for {} returned HTTP {}",
                body.event,
                body.appointment.id,
                response.status()
            );
            return false;
        }
        true
    }
}

impl Notifier for WebhookNotifier {
    async fn notify_booked(&self, appointment: &Appointment) -> bool {
        self.post(WebhookBody {
            event: "booked",
            appointment,
            previous: None,
        })
        .await
    }

    async fn notify_rescheduled(&self, old: &Appointment, new: &Appointment) -> bool {
        self.post(WebhookBody {
            event: "rescheduled",
            appointment: new,
            previous: Some(old),
        })
        .await
    }

    async fn notify_cancelled(&self, appointment: &Appointment) -> bool {
        self.post(WebhookBody {
            event: "cancelled",
            appointment,
            previous: None,
        })
        .await
    }
}
