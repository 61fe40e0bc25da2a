//! Notifier implementations: log line or HTTP webhook.

use async_trait::async_trait;
use nudge_core::config::{NotifierConfig, NotifierKind};
use nudge_core::error::{NudgeError, Result};
use nudge_core::model::Event;
use nudge_core::traits::Notifier;
use std::sync::Arc;

/// Writes the reminder to the log. Default when no transport is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &Event) -> Result<()> {
        tracing::info!(
            "🔔 Reminder: [{}] '{}' for user {}",
            event.kind,
            event.title,
            event.owner_id
        );
        Ok(())
    }
}

/// Generic HTTP webhook: POST with a JSON body per event.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    timeout: std::time::Duration,
}

impl WebhookNotifier {
    pub fn new(url: &str, headers: Vec<(String, String)>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            headers,
            timeout: std::time::Duration::from_secs(timeout_secs),
        }
    }

    fn payload(event: &Event) -> serde_json::Value {
        serde_json::json!({
            "id": event.id,
            "ownerId": event.owner_id,
            "title": event.title,
            "description": event.description,
            "type": event.kind,
            "scheduledFor": event.scheduled_for.map(|t| t.to_rfc3339()),
            "source": "nudge",
        })
    }
}

/// Rate limiting and server faults are worth retrying next cycle; anything
/// else means the request itself is wrong.
fn classify_status(status: reqwest::StatusCode) -> NudgeError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        NudgeError::RecoverableNotification(format!("webhook returned {status}"))
    } else {
        NudgeError::Notification(format!("webhook rejected notification: {status}"))
    }
}

fn classify_transport(e: reqwest::Error) -> NudgeError {
    if e.is_timeout() || e.is_connect() {
        NudgeError::RecoverableNotification(format!("webhook unreachable: {e}"))
    } else {
        NudgeError::Notification(format!("webhook send failed: {e}"))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, event: &Event) -> Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&Self::payload(event))
            .timeout(self.timeout);

        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req.send().await.map_err(classify_transport)?;

        if resp.status().is_success() {
            tracing::debug!("✅ Webhook notification sent to {}: {}", self.url, event.title);
            Ok(())
        } else {
            Err(classify_status(resp.status()))
        }
    }
}

/// Build the notifier named in config.
pub fn notifier_from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        NotifierKind::Webhook => {
            if config.url.trim().is_empty() {
                return Err(NudgeError::Configuration(
                    "notifier.url is required for the webhook notifier".into(),
                ));
            }
            let headers = config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Ok(Arc::new(WebhookNotifier::new(
                &config.url,
                headers,
                config.timeout_secs,
            )))
        }
    }
}
