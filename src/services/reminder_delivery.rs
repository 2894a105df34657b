use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::services::rent_reminders::ReminderPayload;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Transport(String),
    #[error("webhook returned status {0}")]
    Status(u16),
}

/// Outbound transport for reminder notifications.
#[async_trait]
pub trait ReminderDelivery: Send + Sync {
    async fn deliver(&self, payload: &ReminderPayload) -> Result<(), DeliveryError>;
}

/// POSTs each reminder as JSON to a configured webhook.
pub struct WebhookDelivery {
    http_client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookDelivery {
    pub fn new(http_client: Client, url: &str, timeout: Duration) -> Self {
        Self {
            http_client,
            url: url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ReminderDelivery for WebhookDelivery {
    async fn deliver(&self, payload: &ReminderPayload) -> Result<(), DeliveryError> {
        let response = self
            .http_client
            .post(&self.url)
            .timeout(self.timeout)
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|error| {
                tracing::error!(%error, "Reminder webhook request failed");
                DeliveryError::Transport(error.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }
}
