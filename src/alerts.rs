//! Alert delivery
//!
//! The scan itself only produces [`Alert`] values. An [`AlertManager`] hands
//! each of them to every configured sink; a failing sink is logged and never
//! keeps the others from receiving the alert.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::config::{self, Discord, Webhook};
use crate::discord::DiscordManager;
use crate::messages::{Alert, ScanResult};

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Writes alerts to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        warn!(
            process = %alert.process_id,
            kind = %alert.kind,
            node = %alert.node,
            "{}",
            alert.message
        );
        Ok(())
    }
}

/// POSTs a JSON payload per alert
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    webhook: Webhook,
}

impl WebhookSink {
    /// `timeout` bounds each delivery request
    pub fn new(webhook: Webhook, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook client")?;

        Ok(Self { client, webhook })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip_all, fields(process = %alert.process_id, node = %alert.node))]
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        let payload = json!({
            "message": alert.message,
            "process": alert.process_id,
            "kind": alert.kind,
            "node": alert.node,
            "reason": alert.reason,
            "timestamp": alert.raised_at.to_rfc3339()
        });

        let response = self.client.post(&self.webhook.url).json(&payload).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("webhook alert failed with status: {}", response.status());
        }

        info!("Successfully sent webhook alert");
        Ok(())
    }
}

/// Posts a Discord message with an embed per alert
#[derive(Debug, Clone)]
pub struct DiscordSink {
    manager: DiscordManager,
    discord: Discord,
}

impl DiscordSink {
    pub fn new(discord: Discord, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            manager: DiscordManager::new(timeout)?,
            discord,
        })
    }
}

#[async_trait]
impl AlertSink for DiscordSink {
    fn name(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        let message = self.manager.build_message(&self.discord, alert);
        self.manager.send_message(&self.discord, &message).await
    }
}

pub struct AlertManager {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl AlertManager {
    pub fn new(sinks: Vec<Box<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    /// Log sink plus one sink per configured alert target
    pub fn from_config(alerts: &[config::Alert], timeout: Duration) -> anyhow::Result<Self> {
        let mut sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(LogSink)];

        for alert in alerts {
            match alert {
                config::Alert::Webhook(webhook) => {
                    sinks.push(Box::new(WebhookSink::new(webhook.clone(), timeout)?))
                }
                config::Alert::Discord(discord) => {
                    sinks.push(Box::new(DiscordSink::new(discord.clone(), timeout)?))
                }
            }
        }

        Ok(Self { sinks })
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    /// Deliver every alert of `result` to every sink
    ///
    /// Returns the number of failed deliveries.
    #[instrument(skip_all, fields(alerts = result.alerts.len()))]
    pub async fn dispatch(&self, result: &ScanResult) -> usize {
        let mut failures = 0;

        for alert in &result.alerts {
            for sink in &self.sinks {
                if let Err(e) = sink.deliver(alert).await {
                    error!(
                        "failed to deliver alert for {} on {} via {}: {e:#}",
                        alert.process_id,
                        alert.node,
                        sink.name()
                    );
                    failures += 1;
                }
            }
        }

        failures
    }
}
