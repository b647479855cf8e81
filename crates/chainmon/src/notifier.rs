//! Notification port. The orchestrator's outcome is always logged; a
//! webhook is best-effort on top of that and never blocks or retries.

use async_trait::async_trait;
use chain_orchestrator::Outcome;
use chain_proto::HealthEvent;
use tracing::{info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &HealthEvent, outcome: &Outcome) -> Result<(), String>;
}

#[async_trait]
impl Notifier for Box<dyn Notifier> {
    async fn notify(&self, event: &HealthEvent, outcome: &Outcome) -> Result<(), String> {
        (**self).notify(event, outcome).await
    }
}

/// Logs the event and outcome at `info`/`warn`. Always the fallback notifier
/// when no webhook is configured — delivery can never fail outright.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, event: &HealthEvent, outcome: &Outcome) -> Result<(), String> {
        match outcome {
            Outcome::Restarted => info!(condition = ?event.condition, layer = ?event.layer, "restart completed"),
            Outcome::Skipped(reason) => info!(condition = ?event.condition, reason, "restart skipped"),
            Outcome::Failed(reason) => warn!(condition = ?event.condition, layer = ?event.layer, reason, "restart failed"),
        }
        Ok(())
    }
}

/// Posts a JSON payload to a fixed webhook URL. Failures are returned to the
/// caller to log — a dead webhook never stops the monitor loop.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self { client: reqwest::Client::new(), url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &HealthEvent, outcome: &Outcome) -> Result<(), String> {
        let (outcome_label, detail) = match outcome {
            Outcome::Restarted => ("restarted", None),
            Outcome::Skipped(reason) => ("skipped", Some(reason.clone())),
            Outcome::Failed(reason) => ("failed", Some(reason.clone())),
        };

        let payload = serde_json::json!({
            "condition": event.condition,
            "layer": event.layer,
            "node_ids": event.node_ids,
            "description": event.description,
            "suggested_action": event.suggested_action,
            "outcome": outcome_label,
            "outcome_detail": detail,
            "timestamp": event.timestamp,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("webhook returned status {}", response.status()));
        }
        Ok(())
    }
}
