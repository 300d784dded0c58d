use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::config::{Alert, Webhook};
use crate::{DeviceId, state_label};

/// Sink for device state change alerts
///
/// Delivery failures are logged by the implementation; callers never see
/// them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_state_change(&self, device_id: DeviceId, device_name: &str, alive: bool);
}

/// Build the notifier selected by the `alert` config section
pub fn notifier_from_config(alert: Option<&Alert>) -> Arc<dyn Notifier> {
    match alert {
        Some(Alert::Webhook(webhook)) => Arc::new(WebhookNotifier::new(webhook.clone())),
        None => Arc::new(LogNotifier),
    }
}

pub fn format_state_message(device_id: DeviceId, device_name: &str, alive: bool) -> String {
    if alive {
        format!("✅ **Transcoder UP**: `{device_name}` (#{device_id}) is reachable again")
    } else {
        format!("🔴 **Transcoder DOWN**: `{device_name}` (#{device_id}) stopped responding")
    }
}

/// Only writes the alert to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_state_change(&self, device_id: DeviceId, device_name: &str, alive: bool) {
        if alive {
            info!("{}", format_state_message(device_id, device_name, alive));
        } else {
            warn!("{}", format_state_message(device_id, device_name, alive));
        }
    }
}

/// Posts alerts as JSON to a webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook: Webhook,
}

impl WebhookNotifier {
    pub fn new(webhook: Webhook) -> Self {
        Self {
            client: Client::new(),
            webhook,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self))]
    async fn notify_state_change(&self, device_id: DeviceId, device_name: &str, alive: bool) {
        let payload = json!({
            "message": format_state_message(device_id, device_name, alive),
            "device_id": device_id,
            "device": device_name,
            "state": state_label(alive),
            "timestamp": Utc::now().to_rfc3339()
        });

        match self.client.post(&self.webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook alert");
                } else {
                    error!("Webhook alert failed with status: {}", response.status());
                }
            }
            Err(e) => {
                error!("Failed to send webhook alert: {}", e);
            }
        }
    }
}
