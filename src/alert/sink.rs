use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::alert::engine::AlertEvent;
use crate::alert::rules::AlertEventKind;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<()>;
}

pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        let kind = event.kind.as_slug();
        match event.kind {
            AlertEventKind::SyncRestored => info!(kind, "{} - {}", event.title, event.body),
            _ => warn!(kind, "{} - {}", event.title, event.body),
        }
        Ok(())
    }
}

pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    fn is_discord(&self) -> bool {
        self.url.contains("discord.com/api/webhooks")
            || self.url.contains("discordapp.com/api/webhooks")
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        let request = if self.is_discord() {
            let content = format!("**{}**\n{}", event.title, event.body);
            self.client
                .post(&self.url)
                .json(&serde_json::json!({ "content": content }))
        } else {
            self.client.post(&self.url).json(event)
        };

        request
            .send()
            .await
            .with_context(|| format!("failed posting alert to {}", self.url))?
            .error_for_status()?;
        Ok(())
    }
}
