use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::Discord;
use crate::messages::{Alert, AlertReason};

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

fn field(name: &str, value: impl ToString, inline: bool) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value: value.to_string(),
        inline,
    }
}

#[derive(Debug, Clone)]
pub struct DiscordManager {
    client: Client,
}

impl DiscordManager {
    /// `timeout` bounds each request to the Discord webhook
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build discord client")?;

        Ok(Self { client })
    }

    pub fn build_drift_embed(&self, alert: &Alert) -> Embed {
        let (title, color, mut fields) = match &alert.reason {
            AlertReason::Lagging {
                drift,
                node_slot,
                scheduler_slot,
                attempts,
            } => (
                "🐢 Node Lagging",
                15105570, // Orange
                vec![
                    field("📉 Drift", format!("{drift} slots"), true),
                    field("🧮 Node Slot", node_slot, true),
                    field("🗓️ Scheduler Slot", scheduler_slot, true),
                    field("🔁 Attempts", attempts, true),
                ],
            ),
            AlertReason::Unreachable { attempts, error } => (
                "🔴 Node Unreachable",
                15158332, // Red
                vec![
                    field("🔁 Attempts", attempts, true),
                    field("❗ Error", format!("`{error}`"), false),
                ],
            ),
        };

        fields.insert(0, field("⚙️ Kind", &alert.kind, true));

        Embed {
            title: Some(title.to_string()),
            description: Some(format!(
                "Process **{}** on node **{}**",
                alert.process_id, alert.node
            )),
            color: Some(color),
            fields,
            footer: Some(EmbedFooter {
                text: format!("Node: {}", alert.node),
            }),
            timestamp: Some(alert.raised_at.to_rfc3339()),
        }
    }

    pub fn build_message(&self, discord: &Discord, alert: &Alert) -> Message {
        let mut builder = MessageBuilder::new().add_embed(self.build_drift_embed(alert));
        if let Some(user_id) = &discord.user_id {
            builder = builder.content(format!("⏱️ `{}` <@{user_id}>", alert.process_id));
        }
        builder.build()
    }

    #[instrument(skip(self, discord, message))]
    pub async fn send_message(&self, discord: &Discord, message: &Message) -> anyhow::Result<()> {
        let response = self.client.post(&discord.url).json(message).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord message failed with status {status}: {error_text}");
        }

        info!("Successfully sent Discord message at {}", Utc::now().to_rfc3339());
        Ok(())
    }
}
