//! Notification sink for human escalation
//!
//! A single capability: deliver a message to an operator target. Delivery is
//! fire-and-forget — `notify` returns immediately, the actual send happens
//! in a spawned task, failures are logged and never retried. Escalation
//! state in the account is set regardless of delivery success, giving
//! at-most-once escalation per death episode.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

/// Capability surface the supervisor escalates through.
pub trait Notifier: Send + Sync {
    /// Deliver `message` to `target`. Must not block the caller.
    fn notify(&self, target: &str, message: &str);
}

/// Escalation payload posted to the webhook.
#[derive(Debug, Serialize)]
struct WebhookPayload {
    target: String,
    content: String,
}

/// Webhook-backed notifier. POSTs a small JSON payload to the configured
/// endpoint in a spawned task.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "failed to build webhook client, falling back to one without a timeout");
                reqwest::Client::default()
            }
        };
        Self {
            http,
            url: url.to_string(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, target: &str, message: &str) {
        let http = self.http.clone();
        let url = self.url.clone();
        let payload = WebhookPayload {
            target: target.to_string(),
            content: message.to_string(),
        };
        let target = payload.target.clone();

        tokio::spawn(async move {
            let result = http.post(&url).json(&payload).send().await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    info!(%target, "escalation notification delivered");
                }
                Ok(resp) => {
                    warn!(%target, status = %resp.status(), "webhook rejected notification");
                }
                Err(e) => {
                    warn!(%target, error = %e, "failed to deliver notification");
                }
            }
        });
    }
}

/// Fallback when no webhook is configured: escalations surface in the log
/// stream only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, target: &str, message: &str) {
        error!(%target, %message, "ESCALATION (no webhook configured)");
    }
}

/// Build the notifier from configuration.
pub fn build(settings: &crate::config::NotifierSettings) -> Arc<dyn Notifier> {
    match &settings.webhook_url {
        Some(url) if !url.is_empty() => {
            info!(%url, "webhook notifier configured");
            Arc::new(WebhookNotifier::new(url))
        }
        _ => {
            info!("no webhook configured, escalations will be logged only");
            Arc::new(LogNotifier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Construction must always yield a usable client, and delivery must
    /// return immediately even when the endpoint is unreachable.
    #[tokio::test]
    async fn notify_returns_without_blocking() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/unreachable");
        notifier.notify("ops", "test message");
        // The send happens in a spawned task; reaching this line at all is
        // the assertion.
    }
}
