use std::time::Duration;

use anyhow::{anyhow, Result};
use extract_loader_core::config::NotifyConfig;
use extract_loader_core::store::Notifier;
use serde_json::json;
use tracing::{debug, info};

/// Writes notifications to the tracing log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        info!(subject, body, "notification");
        Ok(())
    }
}

/// Posts `{"subject", "body", "host"}` as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    host: String,
    timeout: Duration,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(url: impl Into<String>, host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            host: host.into(),
            timeout,
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let payload = json!({
            "subject": subject,
            "body": body,
            "host": self.host,
        });

        match agent
            .request("POST", &self.url)
            .set("content-type", "application/json")
            .send_json(&payload)
        {
            Ok(response) => {
                debug!(url = %self.url, status = response.status(), "webhook delivered");
                Ok(())
            }
            Err(ureq::Error::Status(code, _)) => {
                Err(anyhow!("webhook {} answered http status {code}", self.url))
            }
            Err(ureq::Error::Transport(err)) => {
                Err(anyhow!("webhook {} transport failure: {err}", self.url))
            }
        }
    }
}

/// Webhook when one is configured, the log otherwise.
#[must_use]
pub fn notifier_from_config(config: &NotifyConfig, host: &str) -> Box<dyn Notifier> {
    match &config.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(
            url.clone(),
            host,
            Duration::from_millis(config.timeout_ms),
        )),
        None => Box::new(LogNotifier),
    }
}
